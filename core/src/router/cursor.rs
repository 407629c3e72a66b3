use agentkit_config::ActionPlan;

/// Per-run position in an action plan. The plan itself is never mutated,
/// so one plan can serve any number of concurrent runs.
#[derive(Debug, Clone)]
pub struct PlanCursor<'a> {
  plan: &'a ActionPlan,
  next: usize,
}

impl<'a> PlanCursor<'a> {
  pub fn new(plan: &'a ActionPlan) -> Self {
    Self { plan, next: 0 }
  }

  pub fn plan(&self) -> &'a ActionPlan {
    self.plan
  }

  /// Steps already handed out.
  pub fn position(&self) -> usize {
    self.next
  }

  pub fn remaining(&self) -> usize {
    self.plan.actions.len().saturating_sub(self.next)
  }

  pub fn is_exhausted(&self) -> bool {
    self.remaining() == 0
  }

  /// Tool names of the next step.
  pub fn next_step(&mut self) -> Option<&'a [String]> {
    let step = self.plan.actions.get(self.next)?;
    self.next += 1;
    Some(step.as_slice())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn plan() -> ActionPlan {
    ActionPlan {
      name: "sql".to_string(),
      description: "query then summarise".to_string(),
      actions: vec![
        vec!["memory".to_string(), "sql_tool".to_string()],
        vec!["summarizer_tool".to_string()],
      ],
    }
  }

  #[test]
  fn cursor_walks_steps_without_touching_the_plan() {
    let plan = plan();
    let mut first = PlanCursor::new(&plan);
    let mut second = PlanCursor::new(&plan);

    assert_eq!(first.next_step(), Some(&plan.actions[0][..]));
    assert_eq!(first.remaining(), 1);
    assert_eq!(first.next_step(), Some(&plan.actions[1][..]));
    assert!(first.is_exhausted());
    assert_eq!(first.next_step(), None);
    assert_eq!(first.position(), 2);

    assert_eq!(second.position(), 0);
    assert_eq!(second.next_step(), Some(&plan.actions[0][..]));
    assert_eq!(plan.step_count(), 2);
  }
}
