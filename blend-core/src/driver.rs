//! Pass orchestration.
//!
//! The driver owns the strict pass order: lex → parse → module checks →
//! symbol table → type resolve → type check → CFG + access → call graph
//! (with the recursion gate) → static frame allocation → IL generation.
//! After every pass it inspects the diagnostic list and stops before the
//! next pass once an error has been recorded; the recursion check gates
//! frame allocation unconditionally.

use crate::ast::Ast;
use crate::diagnostics::Diagnostics;
use crate::frame::FrameMap;
use crate::ilgen::IlProgram;
use crate::platform::CompilerConfig;
use crate::typecheck::Analysis;
use crate::{alloc, callgraph, cfg, funcs, ilgen, lexer, modules, parser, symtab, typecheck};
use blend_types::NodeId;
use thiserror::Error;

/// One source unit: a display name and its text.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Display name (usually the file name).
    pub name: String,
    /// Source text.
    pub source: String,
}

impl SourceUnit {
    /// Construct a unit.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// Terminal error of a compilation.
#[derive(Debug, Error)]
pub enum CompileError {
    /// One or more error diagnostics were emitted; no artifact exists.
    #[error("compilation failed with {errors} error(s)")]
    Failed {
        /// Error diagnostic count.
        errors: usize,
        /// The full diagnostic list.
        diagnostics: Diagnostics,
    },
}

/// Everything a successful compilation produces.
#[derive(Debug)]
pub struct Artifacts {
    /// Every variable's address.
    pub frame_map: FrameMap,
    /// The lowered program.
    pub il: IlProgram,
    /// Warnings and infos collected along the way.
    pub diagnostics: Diagnostics,
}

/// Outcome of [`Compiler::compile`], diagnostics included either way.
#[derive(Debug)]
pub struct Compilation {
    /// Present when allocation succeeded.
    pub frame_map: Option<FrameMap>,
    /// Present when IL generation ran.
    pub il: Option<IlProgram>,
    /// All diagnostics, in emission order.
    pub diagnostics: Diagnostics,
}

impl Compilation {
    /// Whether artifacts were produced.
    pub fn succeeded(&self) -> bool {
        !self.diagnostics.has_errors() && self.frame_map.is_some() && self.il.is_some()
    }

    /// Convert into a hard result.
    pub fn into_result(self) -> Result<Artifacts, CompileError> {
        match (self.frame_map, self.il) {
            (Some(frame_map), Some(il)) if !self.diagnostics.has_errors() => Ok(Artifacts {
                frame_map,
                il,
                diagnostics: self.diagnostics,
            }),
            _ => Err(CompileError::Failed {
                errors: self.diagnostics.error_count().max(1),
                diagnostics: self.diagnostics,
            }),
        }
    }
}

/// The middle-end entry point.
///
/// Standard library units registered with [`with_library`] are prepended to
/// the user sources before parsing; their module names come from their
/// `module` declarations, never from file names.
///
/// [`with_library`]: Compiler::with_library
#[derive(Debug, Default)]
pub struct Compiler {
    config: CompilerConfig,
    libraries: Vec<SourceUnit>,
}

impl Compiler {
    /// A compiler with the given configuration.
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            libraries: Vec::new(),
        }
    }

    /// Prepend a library unit to every compilation.
    pub fn with_library(mut self, unit: SourceUnit) -> Self {
        self.libraries.push(unit);
        self
    }

    /// The active configuration.
    pub const fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Run the full middle-end over `sources`.
    pub fn compile(&self, sources: &[SourceUnit]) -> Compilation {
        let mut diags = Diagnostics::new();
        let mut ast = Ast::new();

        // Lex + parse, libraries first.
        let mut roots: Vec<NodeId> = Vec::new();
        for (index, unit) in self.libraries.iter().chain(sources).enumerate() {
            tracing::debug!(unit = %unit.name, "parsing");
            let tokens = lexer::lex(index as u16, &unit.source, &mut diags);
            roots.push(parser::parse_unit(
                &mut ast,
                tokens,
                &self.config.default_module,
                &mut diags,
            ));
        }
        if diags.has_errors() {
            return abort(diags);
        }

        // Module graph checks.
        modules::check_cycles(&ast, &roots, &mut diags);
        if diags.has_errors() {
            return abort(diags);
        }

        // Symbol table.
        let mut table = symtab::build(&ast, &roots, &mut diags);
        if diags.has_errors() {
            return abort(diags);
        }

        // Types.
        let mut registry = funcs::collect(&ast, &roots, &table);
        typecheck::resolve(&ast, &roots, &mut table, &mut registry, &mut diags);
        if diags.has_errors() {
            return abort(diags);
        }
        let mut analysis = Analysis::new();
        typecheck::check(&ast, &roots, &mut table, &registry, &mut analysis, &mut diags);
        if diags.has_errors() {
            return abort(diags);
        }

        // Control flow and access profiles.
        let (_cfgs, access) = cfg::analyze(&ast, &table, &registry, &analysis, &mut diags);
        if diags.has_errors() {
            return abort(diags);
        }

        // Call graph; recursion gates everything after it.
        let graph = callgraph::build(
            &ast,
            &table,
            &registry,
            &analysis,
            self.config.call_depth_warning,
            &mut diags,
        );
        if diags.has_errors() || graph.has_recursion() {
            return abort(diags);
        }

        // Static frame allocation.
        let Some(frame_map) = alloc::allocate(
            &ast,
            &table,
            &registry,
            &analysis,
            &access,
            &graph,
            &self.config,
            &mut diags,
        ) else {
            return abort(diags);
        };
        if diags.has_errors() {
            return abort(diags);
        }

        // IL generation.
        let il = ilgen::generate(&ast, &table, &registry, &analysis, &frame_map);

        Compilation {
            frame_map: Some(frame_map),
            il: Some(il),
            diagnostics: diags,
        }
    }
}

fn abort(diagnostics: Diagnostics) -> Compilation {
    Compilation {
        frame_map: None,
        il: None,
        diagnostics,
    }
}

/// Compile with the default C64 configuration.
pub fn compile(sources: &[SourceUnit]) -> Compilation {
    Compiler::default().compile(sources)
}
