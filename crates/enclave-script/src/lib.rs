//! Enclave Script
//!
//! A small Python-flavoured statement language used as the evaluator for
//! enclave contexts:
//! - Lexer (logos) with indentation tracking
//! - Recursive-descent parser producing a statement tree
//! - Tree-walking interpreter that charges steps and allocations to the
//!   executing context
//!
//! The whole program is parsed before anything executes, so a syntax error
//! leaves the context's namespace untouched.
//!
//! # Example
//!
//! ```ignore
//! let evaluator = ScriptEvaluator::builder()
//!     .module(Module::new("config").with_attr("debug", Value::Bool(true)))
//!     .build();
//! let runner = ScriptRunner::new(contexts, shareables, Arc::new(evaluator));
//! ```

#![warn(rust_2018_idioms)]

pub mod ast;
pub mod builtins;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod methods;
pub mod ops;
pub mod parser;

pub use builtins::{is_subclass, OutputSink};
pub use error::SyntaxError;
pub use parser::parse;

use enclave_core::{Evaluator, Exception, Module, Namespace, Scope};
use interp::Interpreter;
use rustc_hash::FxHashMap;
use std::io::Write;
use std::sync::Arc;
use tracing::trace;

/// Evaluator for the script language
pub struct ScriptEvaluator {
    builtins: Namespace,
    modules: FxHashMap<String, Arc<Module>>,
}

impl ScriptEvaluator {
    /// Evaluator with the builtins only, printing to stdout
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ScriptEvaluatorBuilder {
        ScriptEvaluatorBuilder::default()
    }

    /// Names of importable modules, sorted
    pub fn module_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ScriptEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for ScriptEvaluator {
    fn exec(&self, source: &str, scope: &mut Scope<'_>) -> Result<(), Exception> {
        let program = parse(source)?;
        trace!(
            target: "enclave::script",
            context = %scope.context_id(),
            statements = program.body.len(),
            "parsed program"
        );
        Interpreter::new(&self.builtins, &self.modules).run(&program, scope)
    }
}

/// Builder for [`ScriptEvaluator`]
#[derive(Default)]
pub struct ScriptEvaluatorBuilder {
    modules: Vec<Module>,
    output: Option<OutputSink>,
}

impl ScriptEvaluatorBuilder {
    /// Make `module` importable by its name
    pub fn module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    /// Send `print` output to `sink` instead of stdout
    pub fn output(mut self, sink: OutputSink) -> Self {
        self.output = Some(sink);
        self
    }

    pub fn build(self) -> ScriptEvaluator {
        let output = self.output.unwrap_or_else(|| {
            Arc::new(|line: &str| {
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{}", line);
            })
        });

        ScriptEvaluator {
            builtins: builtins::builtins(output),
            modules: self
                .modules
                .into_iter()
                .map(|module| (module.name().to_string(), Arc::new(module)))
                .collect(),
        }
    }
}
