use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use agentkit_config::{AgentConfig, CommonConfig, ConfigError, ToolConfig};
use tracing::debug;

use crate::error::AgentError;
use crate::ports::{ArtifactKind, ArtifactStore, DocumentRetriever, GeneratorFactory, SqlDatabase};
use crate::tools::basellm::BaseLlmTool;
use crate::tools::retrieval::RetrievalTool;
use crate::tools::scheduling::{ArtifactGeneratorTool, ConfigChangesTool};
use crate::tools::sql::SqlTool;
use crate::tools::summarizer::SummarizerTool;
use crate::tools::visualizer::VisualizerTool;
use crate::tools::{Tool, ToolError, ToolLlm};

/// Capabilities shared by every tool of an agent.
#[derive(Clone)]
pub struct ToolServices {
  pub generators: Arc<dyn GeneratorFactory>,
  pub database: Option<Arc<dyn SqlDatabase>>,
  pub retriever: Option<Arc<dyn DocumentRetriever>>,
  pub artifacts: Option<Arc<dyn ArtifactStore>>,
}

impl ToolServices {
  pub fn new(generators: Arc<dyn GeneratorFactory>) -> Self {
    Self {
      generators,
      database: None,
      retriever: None,
      artifacts: None,
    }
  }

  pub fn with_database(mut self, database: Arc<dyn SqlDatabase>) -> Self {
    self.database = Some(database);
    self
  }

  pub fn with_retriever(mut self, retriever: Arc<dyn DocumentRetriever>) -> Self {
    self.retriever = Some(retriever);
    self
  }

  pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
    self.artifacts = Some(artifacts);
    self
  }
}

/// Everything a constructor needs to build one tool.
pub struct ToolBuildContext<'a> {
  pub name: &'a str,
  pub config: &'a ToolConfig,
  pub common: &'a CommonConfig,
  pub llm: ToolLlm,
  pub services: &'a ToolServices,
}

pub type ToolFactory =
  Arc<dyn Fn(&ToolBuildContext<'_>) -> Result<Arc<dyn Tool>, ToolError> + Send + Sync>;

/// Wraps a constructor closure as a [`ToolFactory`].
pub fn factory<F>(build: F) -> ToolFactory
where
  F: Fn(&ToolBuildContext<'_>) -> Result<Arc<dyn Tool>, ToolError> + Send + Sync + 'static,
{
  Arc::new(build)
}

/// Tool name to constructor table.
#[derive(Default)]
pub struct ToolRegistry {
  factories: BTreeMap<String, ToolFactory>,
}

impl ToolRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registry holding every built-in tool.
  pub fn builtin() -> Self {
    let mut registry = Self::new();
    register_builtin_tools(&mut registry);
    registry
  }

  /// Adds a constructor, replacing any tool registered under the same name.
  pub fn register_factory(&mut self, name: impl Into<String>, factory: ToolFactory) {
    self.factories.insert(name.into(), factory);
  }

  pub fn contains(&self, name: &str) -> bool {
    self.factories.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.factories.keys().map(String::as_str)
  }

  /// Builds the tools an agent enables, each with the main and fast model.
  pub fn build(
    &self,
    config: &AgentConfig,
    services: &ToolServices,
    api_key: Option<&str>,
  ) -> Result<Toolset, AgentError> {
    let unknown: Vec<String> = config
      .tools
      .iter()
      .filter(|name| !self.contains(name))
      .cloned()
      .collect();
    if !unknown.is_empty() {
      return Err(AgentError::InvalidTools(unknown));
    }

    let common = &config.common;
    let llm = services.generators.create(&common.llm, api_key)?;
    let fast_llm = services.generators.create(&common.fast_llm, api_key)?;

    let mut tools = HashMap::new();
    for name in &config.tools {
      let tool_config = config
        .tool_config(name)
        .ok_or_else(|| ConfigError::MissingToolConfig(name.clone()))?;
      let Some(build_tool) = self.factories.get(name) else {
        continue;
      };
      let ctx = ToolBuildContext {
        name,
        config: tool_config,
        common,
        llm: ToolLlm::new(llm.clone(), fast_llm.clone(), common.fast_llm_token_limit),
        services,
      };
      let tool = build_tool(&ctx).map_err(|source| AgentError::Tool {
        tool: name.clone(),
        source,
      })?;
      debug!(tool = name.as_str(), "built tool");
      tools.insert(name.clone(), tool);
    }

    Ok(Toolset { tools })
  }
}

fn register_builtin_tools(registry: &mut ToolRegistry) {
  registry.register_factory(
    "sql_tool",
    factory(|ctx| {
      Ok(Arc::new(SqlTool::new(
        ctx.name,
        ctx.config,
        ctx.llm.clone(),
        ctx.services.database.clone(),
      )))
    }),
  );
  registry.register_factory(
    "summarizer_tool",
    factory(|ctx| {
      Ok(Arc::new(SummarizerTool::new(
        ctx.name,
        ctx.config,
        ctx.common.max_token_length,
        ctx.llm.clone(),
      )))
    }),
  );
  registry.register_factory(
    "visualizer_tool",
    factory(|ctx| Ok(Arc::new(VisualizerTool::new(ctx.name, ctx.config, ctx.llm.clone())))),
  );
  registry.register_factory(
    "pdf_tool",
    factory(|ctx| {
      Ok(Arc::new(RetrievalTool::new(
        ctx.name,
        ctx.config,
        ctx.common.max_token_length,
        ctx.services.retriever.clone(),
      )))
    }),
  );
  for name in ["clarify_tool", "expert_tool", "entertainer_tool"] {
    registry.register_factory(
      name,
      factory(|ctx| Ok(Arc::new(BaseLlmTool::new(ctx.name, ctx.config, ctx.llm.clone())))),
    );
  }
  for (name, kind) in [
    ("generate_config_tool", ArtifactKind::OptimizationConfig),
    ("generate_optim_input_tool", ArtifactKind::OptimizationInput),
  ] {
    registry.register_factory(
      name,
      factory(move |ctx| {
        Ok(Arc::new(ArtifactGeneratorTool::new(
          ctx.name,
          kind,
          ctx.config,
          ctx.llm.clone(),
          ctx.services.artifacts.clone(),
        )))
      }),
    );
  }
  registry.register_factory(
    "summarize_config_changes_tool",
    factory(|ctx| {
      Ok(Arc::new(ConfigChangesTool::new(
        ctx.name,
        ctx.config,
        ctx.llm.clone(),
        ctx.services.artifacts.clone(),
      )))
    }),
  );
}

/// The tools built for one agent.
#[derive(Clone, Default)]
pub struct Toolset {
  tools: HashMap<String, Arc<dyn Tool>>,
}

impl Toolset {
  pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
    self.tools.get(name)
  }

  pub fn insert(&mut self, tool: Arc<dyn Tool>) {
    self.tools.insert(tool.name().to_string(), tool);
  }

  pub fn len(&self) -> usize {
    self.tools.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tools.is_empty()
  }
}

impl FromIterator<Arc<dyn Tool>> for Toolset {
  fn from_iter<I: IntoIterator<Item = Arc<dyn Tool>>>(iter: I) -> Self {
    let mut toolset = Toolset::default();
    for tool in iter {
      toolset.insert(tool);
    }
    toolset
  }
}
