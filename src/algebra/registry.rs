//! Variable registry shared by every template of a run.
//!
//! K_i: one registry per run, built once from the declared parameters.
//! Order is declaration order and never changes.

use crate::models::{PacError, Parameter, Result};

/// Ordered, duplicate-free list of template variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRegistry {
    names: Vec<String>,
}

impl VariableRegistry {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registered: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if registered.contains(&name) {
                return Err(PacError::InvalidInput(format!(
                    "variable '{name}' registered twice"
                )));
            }
            registered.push(name);
        }
        Ok(Self { names: registered })
    }

    pub fn from_parameters(parameters: &[Parameter]) -> Result<Self> {
        Self::new(parameters.iter().map(|p| p.name.clone()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_declaration_order() {
        let registry = VariableRegistry::new(["q", "p"]).unwrap();
        assert_eq!(registry.index_of("q"), Some(0));
        assert_eq!(registry.index_of("p"), Some(1));
        assert_eq!(registry.index_of("r"), None);
    }

    #[test]
    fn rejects_duplicates() {
        assert!(VariableRegistry::new(["p", "p"]).is_err());
    }
}
