use std::collections::BTreeMap;

use tally_core::error::{Result, TallyError};

use crate::output::{Output, OutputConfig};

pub type OutputConstructor = fn(&OutputConfig) -> Result<Output>;

/// Maps output kind names to constructors.
///
/// Populated explicitly at startup; nothing registers itself.
#[derive(Clone, Default)]
pub struct OutputRegistry {
    constructors: BTreeMap<String, OutputConstructor>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `stdout`, `http` and `queue`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.constructors.insert("stdout".to_string(), Output::stdout);
        registry.constructors.insert("http".to_string(), Output::http);
        registry.constructors.insert("queue".to_string(), Output::queue);
        registry
    }

    pub fn register(&mut self, kind: &str, constructor: OutputConstructor) -> Result<()> {
        let kind = kind.to_ascii_lowercase();
        if self.constructors.contains_key(&kind) {
            return Err(TallyError::Config(format!(
                "output kind {kind} is already registered"
            )));
        }
        self.constructors.insert(kind, constructor);
        Ok(())
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn build(&self, cfg: &OutputConfig) -> Result<Output> {
        let kind = cfg.kind.to_ascii_lowercase();
        let constructor = self.constructors.get(&kind).ok_or_else(|| {
            TallyError::Config(format!(
                "unknown output kind {}; registered kinds: {}",
                cfg.kind,
                self.kinds().join(", ")
            ))
        })?;
        constructor(cfg)
    }
}
