//! Named-stage interception
//!
//! External code registers filters against a stage name. "Before" filters
//! run ahead of the stage's work and may rewrite its input; "after" filters
//! run once it finishes and may rewrite its output. Filters run in
//! registration order and the first error aborts the build.

use modsmith_errors::Error;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::description::BuildDescription;
use crate::packaging::BuildOutput;

/// Stage names the orchestrator dispatches
pub mod stages {
    /// The freshly defaulted description, before scaffolding
    pub const BUILD_CONFIGURE: &str = "build.configure";
    /// The prepared description, around the package-manager run
    pub const NPM_CONFIGURE: &str = "npm.configure";
    /// The patched manifest, before it is written back
    pub const NPM_PACKAGE: &str = "npm.package";
    /// The packaged output, before it is returned
    pub const BUILD_OUTPUT: &str = "build.output";
}

/// What a filter may inspect and rewrite
pub struct HookPayload<'a> {
    pub description: &'a mut BuildDescription,
    /// Present for `npm.package`
    pub manifest: Option<&'a mut Value>,
    /// Present for `build.output`
    pub output: Option<&'a mut BuildOutput>,
}

impl<'a> HookPayload<'a> {
    #[must_use]
    pub fn new(description: &'a mut BuildDescription) -> Self {
        Self {
            description,
            manifest: None,
            output: None,
        }
    }

    #[must_use]
    pub fn with_manifest(mut self, manifest: &'a mut Value) -> Self {
        self.manifest = Some(manifest);
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: &'a mut BuildOutput) -> Self {
        self.output = Some(output);
        self
    }
}

/// A stage filter
pub type Filter = Arc<dyn Fn(&mut HookPayload<'_>) -> Result<(), Error> + Send + Sync>;

#[derive(Default, Clone)]
struct StageHooks {
    before: Vec<Filter>,
    after: Vec<Filter>,
}

/// Registered filters by stage name
#[derive(Default, Clone)]
pub struct HookRegistry {
    stages: HashMap<String, StageHooks>,
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filter to run before `stage`
    pub fn before<F>(&mut self, stage: &str, filter: F) -> &mut Self
    where
        F: Fn(&mut HookPayload<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.stages
            .entry(stage.to_string())
            .or_default()
            .before
            .push(Arc::new(filter));
        self
    }

    /// Register a filter to run after `stage`
    pub fn after<F>(&mut self, stage: &str, filter: F) -> &mut Self
    where
        F: Fn(&mut HookPayload<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.stages
            .entry(stage.to_string())
            .or_default()
            .after
            .push(Arc::new(filter));
        self
    }

    /// Run the "before" filters of `stage`
    ///
    /// # Errors
    ///
    /// Returns the first filter error.
    pub fn run_before(&self, stage: &str, payload: &mut HookPayload<'_>) -> Result<(), Error> {
        self.run(stage, payload, |hooks| &hooks.before)
    }

    /// Run the "after" filters of `stage`
    ///
    /// # Errors
    ///
    /// Returns the first filter error.
    pub fn run_after(&self, stage: &str, payload: &mut HookPayload<'_>) -> Result<(), Error> {
        self.run(stage, payload, |hooks| &hooks.after)
    }

    /// Dispatch a stage that has no work of its own: before, then after
    ///
    /// # Errors
    ///
    /// Returns the first filter error.
    pub fn perform(&self, stage: &str, payload: &mut HookPayload<'_>) -> Result<(), Error> {
        self.run_before(stage, payload)?;
        self.run_after(stage, payload)
    }

    /// Number of filters registered for `stage`
    #[must_use]
    pub fn len(&self, stage: &str) -> usize {
        self.stages
            .get(stage)
            .map_or(0, |hooks| hooks.before.len() + hooks.after.len())
    }

    fn run(
        &self,
        stage: &str,
        payload: &mut HookPayload<'_>,
        select: impl Fn(&StageHooks) -> &Vec<Filter>,
    ) -> Result<(), Error> {
        let Some(hooks) = self.stages.get(stage) else {
            return Ok(());
        };
        for filter in select(hooks) {
            filter(payload)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .stages
            .keys()
            .map(|stage| (stage.as_str(), self.len(stage)))
            .collect();
        f.debug_struct("HookRegistry").field("stages", &counts).finish()
    }
}
