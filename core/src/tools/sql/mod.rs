//! SQL tool: table selection, query generation and a bounded
//! validate/repair loop against the read-only database port.

pub mod parse;
pub mod safety;

pub use parse::{Validation, parse_query, parse_validation};
pub use safety::{SqlSafetyFilter, is_sql_query_safe};

use std::sync::Arc;

use agentkit_config::{SqlToolOptions, ToolConfig, ToolPrompts};
use agentkit_protocol::{Metadata, ToolInput};
use async_trait::async_trait;
use itertools::Itertools;
use serde_json::Value;
use tracing::info;

use crate::bus::metadata;
use crate::ports::{PromptMessage, QueryRows, SqlDatabase};
use crate::tools::{RunContext, Tool, ToolError, ToolLlm, ToolOutput, standard_query_format};

pub const APPENDIX_TITLE: &str = "Table Appendix";
/// Repairs after the first candidate; the loop validates at most four queries.
pub const MAX_REPAIRS: usize = 3;
const MAX_CELL_CHARS: usize = 100;
const NO_DATA: &str = "no_data";

#[derive(Debug, Clone, PartialEq)]
struct Verdict {
  is_valid: bool,
  results: String,
  complaint: String,
}

impl Verdict {
  fn invalid(complaint: impl Into<String>) -> Self {
    Self {
      is_valid: false,
      results: String::new(),
      complaint: complaint.into(),
    }
  }
}

pub struct SqlTool {
  name: String,
  description: String,
  prompts: ToolPrompts,
  options: SqlToolOptions,
  llm: ToolLlm,
  database: Option<Arc<dyn SqlDatabase>>,
}

impl SqlTool {
  pub fn new(
    name: impl Into<String>,
    config: &ToolConfig,
    llm: ToolLlm,
    database: Option<Arc<dyn SqlDatabase>>,
  ) -> Self {
    let prompts = config.render();
    Self {
      name: name.into(),
      description: prompts.description.to_string(),
      prompts,
      options: config.sql.clone(),
      llm,
      database,
    }
  }

  async fn list_tables(&self, question: &str, ctx: &RunContext) -> Result<Vec<String>, ToolError> {
    ctx.action(&self.name, "list_tables_sql_db", 1, Metadata::new());
    let messages = [
      PromptMessage::system(
        self
          .prompts
          .system_context_selection
          .as_ref()
          .map(|template| template.format(&[]))
          .unwrap_or_default(),
      ),
      PromptMessage::human(
        self
          .prompts
          .prompt_selection
          .as_ref()
          .map(|template| template.format(&[("question", question)]))
          .unwrap_or_default(),
      ),
    ];
    let response = self.llm.generate(&messages, true).await?;
    let tables: Vec<String> = response.split(',').map(|table| table.trim().to_string()).collect();
    info!("Filtered tables: {tables:?}");
    Ok(tables)
  }

  /// Schemas of the selected tables, one `DB.TABLE name: ...` line each.
  async fn table_schemas(
    &self,
    database: &dyn SqlDatabase,
    tables: &[String],
    ctx: &RunContext,
  ) -> Result<String, ToolError> {
    ctx.action(&self.name, "schema_sql_db", 1, Metadata::new());
    let wanted: Vec<String> = tables.iter().map(|table| table.to_uppercase()).collect();
    let schemas = database
      .tables()
      .await?
      .into_iter()
      .filter(|table| wanted.contains(&table.name().to_uppercase()))
      .map(|table| {
        format!(
          "DB.TABLE name: {}, Table structure: {}",
          table.name(),
          table.structure
        )
      })
      .join("\n");
    Ok(schemas)
  }

  async fn generate_query(&self, schemas: &str, question: &str) -> Result<String, ToolError> {
    let messages = [
      PromptMessage::system(self.prompts.system_context.format(&[])),
      PromptMessage::human(
        self
          .prompts
          .prompt_message
          .format(&[("table_schemas", schemas), ("question", question)]),
      ),
    ];
    Ok(self.llm.generate(&messages, true).await?)
  }

  /// Checks one candidate. Only an unparsable answer is an error; every
  /// other failure becomes the complaint for the next repair.
  async fn validate(
    &self,
    database: &dyn SqlDatabase,
    question: &str,
    response: &str,
    ctx: &RunContext,
  ) -> Result<Verdict, ToolError> {
    let limit = self
      .options
      .always_limit_query
      .then_some(self.options.nb_example_rows);
    let query = parse_query(response, limit)?;
    if !is_sql_query_safe(&query) {
      return Ok(Verdict::invalid(
        "The SQL query contains forbidden keywords (DML, DDL statements)",
      ));
    }

    let verdict = match self.check_results(database, &query, question, response).await {
      Ok(verdict) => verdict,
      Err(err) => {
        ctx.sink.on_tool_error(&self.name, &format!("{err:?}"));
        return Ok(Verdict::invalid(err.to_string()));
      }
    };

    info!(
      "Validation: {:?} (success={})",
      verdict.complaint, verdict.is_valid
    );
    ctx.action(
      &self.name,
      "validate_sql_query",
      1,
      metadata([("success", Value::from(verdict.is_valid))]),
    );
    Ok(verdict)
  }

  async fn check_results(
    &self,
    database: &dyn SqlDatabase,
    query: &str,
    question: &str,
    response: &str,
  ) -> Result<Verdict, ToolError> {
    let Some(rows) = database.execute(query).await? else {
      return Ok(Verdict::invalid(
        "The SQL query did not return any results: None",
      ));
    };
    if self.options.validate_empty_results && rows.is_empty() {
      return Ok(Verdict::invalid(
        "The SQL query executed but did not return any result rows.",
      ));
    }

    let results = format!(
      "total rows from SQL query: {}, first {} rows: {}",
      rows.len(),
      self.options.nb_example_rows,
      sample_rows(&rows, self.options.nb_example_rows)
    );
    if !self.options.validate_with_llm {
      return Ok(Verdict {
        is_valid: true,
        results,
        complaint: String::new(),
      });
    }

    let messages = [
      PromptMessage::system(
        self
          .prompts
          .system_context_validation
          .as_ref()
          .map(|template| template.format(&[]))
          .unwrap_or_default(),
      ),
      PromptMessage::human(
        self
          .prompts
          .prompt_validation
          .as_ref()
          .map(|template| {
            template.format(&[
              ("query", response),
              ("result", &results),
              ("question", question),
            ])
          })
          .unwrap_or_default(),
      ),
    ];
    let answer = self.llm.generate(&messages, false).await?;
    let validation = parse_validation(&answer);
    Ok(Verdict {
      is_valid: validation.is_valid,
      results,
      complaint: validation.complaint,
    })
  }

  async fn improve_query(
    &self,
    question: &str,
    previous: &str,
    complaint: &str,
    schemas: &str,
    ctx: &RunContext,
  ) -> Result<String, ToolError> {
    ctx.action(&self.name, "improve_sql_query", 1, Metadata::new());
    let system = self
      .prompts
      .system_context_refinement
      .as_ref()
      .unwrap_or(&self.prompts.system_context)
      .format(&[]);
    let prompt = self
      .prompts
      .prompt_refinement
      .as_ref()
      .map(|template| {
        template.format(&[
          ("previous_answer", previous),
          ("complaints", complaint),
          ("table_schemas", schemas),
          ("question", question),
        ])
      })
      .unwrap_or_default();
    let messages = [PromptMessage::system(system), PromptMessage::human(prompt)];
    Ok(self.llm.generate(&messages, false).await?)
  }

  fn no_data(&self, ctx: &RunContext, result: &str) {
    ctx.action(
      &self.name,
      NO_DATA,
      1,
      metadata([("result", Value::from(result))]),
    );
  }
}

#[async_trait]
impl Tool for SqlTool {
  fn name(&self) -> &str {
    &self.name
  }

  fn description(&self) -> &str {
    &self.description
  }

  async fn run(&self, input: &ToolInput, ctx: &RunContext) -> Result<ToolOutput, ToolError> {
    let database = self
      .database
      .as_deref()
      .ok_or(ToolError::Unavailable("SQL database"))?;
    let question = standard_query_format(input);

    let tables = self.list_tables(&question, ctx).await?;
    let schemas = self.table_schemas(database, &tables, ctx).await?;
    if schemas.is_empty() {
      self.no_data(ctx, NO_DATA);
      return Ok(ToolOutput::Text(NO_DATA.to_string()));
    }

    let mut response = self.generate_query(&schemas, &question).await?;
    let mut repairs = 0;
    loop {
      let verdict = self.validate(database, &question, &response, ctx).await?;
      if verdict.is_valid {
        ctx.appendix(&self.name, &response, APPENDIX_TITLE);
        return Ok(ToolOutput::Text(format!("{response}, {}", verdict.results)));
      }
      if repairs >= MAX_REPAIRS {
        self.no_data(ctx, &response);
        return Ok(ToolOutput::Text(response));
      }
      response = self
        .improve_query(&question, &response, &verdict.complaint, &schemas, ctx)
        .await?;
      repairs += 1;
    }
  }
}

/// First `count` rows rendered as `a,b;c,d` with long cells cut.
fn sample_rows(rows: &QueryRows, count: usize) -> String {
  rows
    .rows
    .iter()
    .take(count)
    .map(|row| row.iter().map(render_cell).join(","))
    .join(";")
    .replace('\n', "")
}

fn render_cell(cell: &Value) -> String {
  let text = match cell {
    Value::Null => "None".to_string(),
    Value::Bool(true) => "True".to_string(),
    Value::Bool(false) => "False".to_string(),
    Value::String(text) => text.clone(),
    other => other.to_string(),
  };
  if text.chars().count() > MAX_CELL_CHARS {
    let cut: String = text.chars().take(MAX_CELL_CHARS).collect();
    format!("{cut}...")
  } else {
    text
  }
}
