//! Function registry.
//!
//! # Responsibility
//! - Hold the `(function, meta)` pairs and proc macros loaded from plugins.
//! - Preserve registration order, which breaks priority ties during resolution.
//!
//! # Invariants
//! - Function names are unique within each descriptor list.
//! - Registry values are constructed and passed explicitly; there is no global.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Computation function paired with its mandatory meta function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub function_name: String,
    pub meta_function_name: String,
}

impl FunctionDescriptor {
    pub fn new(function_name: impl Into<String>, meta_function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            meta_function_name: meta_function_name.into(),
        }
    }
}

/// Text-transform function with an optional meta function.
///
/// Without a meta function the macro is always eligible at priority 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcMacroDescriptor {
    pub function_name: String,
    pub meta_function_name: Option<String>,
}

impl ProcMacroDescriptor {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            meta_function_name: None,
        }
    }

    pub fn with_meta(
        function_name: impl Into<String>,
        meta_function_name: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            meta_function_name: Some(meta_function_name.into()),
        }
    }
}

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    EmptyFunctionName,
    DuplicateFunction(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyFunctionName => write!(f, "function name must not be blank"),
            Self::DuplicateFunction(name) => write!(f, "function already registered: {name}"),
        }
    }
}

impl Error for RegistryError {}

/// Ordered set of computation functions and proc macros.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: Vec<FunctionDescriptor>,
    proc_macros: Vec<ProcMacroDescriptor>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one function pair after validation. Names are stored trimmed.
    pub fn register_function(
        &mut self,
        descriptor: FunctionDescriptor,
    ) -> Result<(), RegistryError> {
        let descriptor = FunctionDescriptor::new(
            descriptor.function_name.trim(),
            descriptor.meta_function_name.trim(),
        );
        if descriptor.function_name.is_empty() || descriptor.meta_function_name.is_empty() {
            return Err(RegistryError::EmptyFunctionName);
        }
        if self
            .functions
            .iter()
            .any(|existing| existing.function_name == descriptor.function_name)
        {
            return Err(RegistryError::DuplicateFunction(descriptor.function_name));
        }
        self.functions.push(descriptor);
        Ok(())
    }

    /// Appends one proc macro after validation. Names are stored trimmed.
    pub fn register_proc_macro(
        &mut self,
        descriptor: ProcMacroDescriptor,
    ) -> Result<(), RegistryError> {
        let descriptor = ProcMacroDescriptor {
            function_name: descriptor.function_name.trim().to_string(),
            meta_function_name: descriptor
                .meta_function_name
                .map(|meta| meta.trim().to_string()),
        };
        if descriptor.function_name.is_empty() {
            return Err(RegistryError::EmptyFunctionName);
        }
        if matches!(&descriptor.meta_function_name, Some(meta) if meta.is_empty()) {
            return Err(RegistryError::EmptyFunctionName);
        }
        if self
            .proc_macros
            .iter()
            .any(|existing| existing.function_name == descriptor.function_name)
        {
            return Err(RegistryError::DuplicateFunction(descriptor.function_name));
        }
        self.proc_macros.push(descriptor);
        Ok(())
    }

    /// Function pairs in registration order.
    pub fn functions(&self) -> &[FunctionDescriptor] {
        &self.functions
    }

    /// Proc macros in registration order.
    pub fn proc_macros(&self) -> &[ProcMacroDescriptor] {
        &self.proc_macros
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.proc_macros.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{FunctionDescriptor, FunctionRegistry, ProcMacroDescriptor, RegistryError};

    #[test]
    fn keeps_registration_order() {
        let mut registry = FunctionRegistry::new();
        for name in ["b", "a", "c"] {
            registry
                .register_function(FunctionDescriptor::new(name, format!("{name}_meta")))
                .expect("registration");
        }
        let names: Vec<_> = registry
            .functions()
            .iter()
            .map(|descriptor| descriptor.function_name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn rejects_duplicate_and_blank_names() {
        let mut registry = FunctionRegistry::new();
        registry
            .register_function(FunctionDescriptor::new("solve", "solve_meta"))
            .expect("first registration");
        assert_eq!(
            registry
                .register_function(FunctionDescriptor::new("solve", "other_meta"))
                .unwrap_err(),
            RegistryError::DuplicateFunction("solve".to_string())
        );
        assert_eq!(
            registry
                .register_function(FunctionDescriptor::new("  ", "meta"))
                .unwrap_err(),
            RegistryError::EmptyFunctionName
        );
        assert_eq!(
            registry
                .register_proc_macro(ProcMacroDescriptor::with_meta("m", " "))
                .unwrap_err(),
            RegistryError::EmptyFunctionName
        );
    }

    #[test]
    fn padded_names_are_trimmed_before_the_duplicate_check() {
        let mut registry = FunctionRegistry::new();
        registry
            .register_function(FunctionDescriptor::new("solve ", " solve_meta"))
            .expect("first registration");
        assert_eq!(
            registry
                .register_function(FunctionDescriptor::new("solve", "solve_meta"))
                .unwrap_err(),
            RegistryError::DuplicateFunction("solve".to_string())
        );
        assert_eq!(
            registry.functions()[0],
            FunctionDescriptor::new("solve", "solve_meta")
        );

        registry
            .register_proc_macro(ProcMacroDescriptor::new(" latex"))
            .expect("first macro");
        assert_eq!(
            registry
                .register_proc_macro(ProcMacroDescriptor::new("latex "))
                .unwrap_err(),
            RegistryError::DuplicateFunction("latex".to_string())
        );
    }
}
