//! Translation of elaborated designs to SystemVerilog.
//!
//! The pass reads its inputs from and writes its results to the design's
//! metadata table. Components marked with [`ENABLE`] are translated as
//! standalone files; an unmarked component is skipped, but its children are
//! still searched for marked components. Translating a marked component
//! includes its whole subtree and stops the search there.
//!
//! ```rust,ignore
//! design.metadata().set(dut, &translate::ENABLE, true);
//! let outputs = TranslationPass::new("build").run(&design)?;
//! let unchanged = design.metadata().get(dut, &translate::IS_SAME);
//! ```

mod types;
mod verilog;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::TranslationParams;
use crate::design::Design;
use crate::error::TranslationError;
use crate::metadata::MetadataKey;
use crate::types::ComponentId;

// Inputs

/// Translate this component (and its subtree) into its own file.
pub const ENABLE: MetadataKey<bool> = MetadataKey::new("translate.enable");
/// Output file name, without directory. A trailing `.v`/`.sv` is dropped.
pub const EXPLICIT_FILE_NAME: MetadataKey<String> = MetadataKey::new("translate.explicit_file_name");
/// Module name for the translated component instead of its kind.
pub const EXPLICIT_MODULE_NAME: MetadataKey<String> = MetadataKey::new("translate.explicit_module_name");

// Outputs

pub const TRANSLATED: MetadataKey<bool> = MetadataKey::new("translate.translated");
/// The freshly rendered source matched the file already on disk, which was left untouched.
pub const IS_SAME: MetadataKey<bool> = MetadataKey::new("translate.is_same");
pub const TRANSLATED_FILENAME: MetadataKey<String> = MetadataKey::new("translate.translated_filename");
pub const TRANSLATED_TOP_MODULE: MetadataKey<String> = MetadataKey::new("translate.translated_top_module");

const RESERVED: &[&str] = &[
    "always", "always_comb", "always_ff", "always_latch", "and", "assign", "automatic", "begin",
    "bit", "break", "buf", "byte", "case", "casex", "casez", "class", "const", "continue",
    "default", "disable", "do", "else", "end", "endcase", "endclass", "endfunction",
    "endgenerate", "endinterface", "endmodule", "endpackage", "endtask", "enum", "export",
    "for", "force", "forever", "function", "generate", "genvar", "if", "import", "initial",
    "inout", "input", "int", "integer", "interface", "localparam", "logic", "longint", "module",
    "nand", "negedge", "nor", "not", "or", "output", "package", "packed", "parameter",
    "posedge", "real", "reg", "repeat", "return", "shortint", "signed", "static", "string",
    "struct", "supply0", "supply1", "task", "time", "tri", "type", "typedef", "union",
    "unsigned", "var", "void", "while", "wire", "xnor", "xor",
];

/// Turns a hierarchical name into a flat identifier: `enq.msg` becomes
/// `enq__msg` and `words[3]` becomes `words__3`.
pub(crate) fn sanitize(name: &str) -> String {
    name.replace(['.', '['], "__").replace(']', "")
}

pub(crate) fn check_identifier(name: &str, path: &str) -> Result<(), TranslationError> {
    if RESERVED.contains(&name) {
        return Err(TranslationError::ReservedIdentifier {
            name: name.to_string(),
            path: path.to_string(),
        });
    }
    Ok(())
}

/// One file produced by a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationOutput {
    pub component: ComponentId,
    pub path: PathBuf,
    pub top_module: String,
    pub is_same: bool,
}

/// Writes one SystemVerilog file per marked component.
#[derive(Clone, Debug)]
pub struct TranslationPass {
    output_dir: PathBuf,
    extension: String,
}

impl TranslationPass {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            extension: "v".to_string(),
        }
    }

    pub fn from_config(params: &TranslationParams) -> Self {
        Self::new(&params.output_dir).with_extension(params.extension.clone())
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Components the run will translate, in hierarchy order.
    pub fn targets(design: &Design) -> Vec<ComponentId> {
        fn visit(design: &Design, comp: ComponentId, out: &mut Vec<ComponentId>) {
            if design.metadata().get(comp, &ENABLE).unwrap_or(false) {
                out.push(comp);
                return;
            }
            for &child in &design.hierarchy().component(comp).children {
                visit(design, child, out);
            }
        }
        let mut out = Vec::new();
        visit(design, design.top(), &mut out);
        out
    }

    /// Translates every marked component and records the results as metadata.
    ///
    /// Files whose content would not change are not rewritten, so their
    /// modification times survive.
    pub fn run(&self, design: &Design) -> Result<Vec<TranslationOutput>, TranslationError> {
        let metadata = design.metadata();
        metadata.clear_key(&TRANSLATED);
        metadata.clear_key(&IS_SAME);
        metadata.clear_key(&TRANSLATED_FILENAME);
        metadata.clear_key(&TRANSLATED_TOP_MODULE);

        let targets = Self::targets(design);
        debug!(targets = targets.len(), "translation targets collected");

        let render = |comp: &ComponentId| {
            let module_name = metadata.get(*comp, &EXPLICIT_MODULE_NAME);
            verilog::render(design, *comp, module_name.as_deref())
        };
        #[cfg(feature = "parallel")]
        let rendered: Vec<_> = targets.par_iter().map(render).collect();
        #[cfg(not(feature = "parallel"))]
        let rendered: Vec<_> = targets.iter().map(render).collect();

        fs::create_dir_all(&self.output_dir)?;

        let mut outputs = Vec::with_capacity(targets.len());
        for (comp, rendered) in targets.into_iter().zip(rendered) {
            let rendered = rendered?;
            let stem = match metadata.get(comp, &EXPLICIT_FILE_NAME) {
                Some(name) => strip_hdl_suffix(&name).to_string(),
                None => format!("{}__pickled", rendered.top_module),
            };
            let file_name = format!("{stem}.{}", self.extension);
            let path = self.output_dir.join(&file_name);

            let is_same = write_if_changed(&path, &rendered.source)?;
            if is_same {
                debug!(path = %path.display(), "translation unchanged, file left untouched");
            } else {
                info!(
                    component = %design.hierarchy().component_path(comp),
                    path = %path.display(),
                    "translation written"
                );
            }

            metadata.set(comp, &TRANSLATED, true);
            metadata.set(comp, &IS_SAME, is_same);
            metadata.set(comp, &TRANSLATED_FILENAME, file_name);
            metadata.set(comp, &TRANSLATED_TOP_MODULE, rendered.top_module.clone());

            outputs.push(TranslationOutput {
                component: comp,
                path,
                top_module: rendered.top_module,
                is_same,
            });
        }
        Ok(outputs)
    }
}

fn strip_hdl_suffix(name: &str) -> &str {
    name.strip_suffix(".sv")
        .or_else(|| name.strip_suffix(".v"))
        .unwrap_or(name)
}

/// Writes `source` to `<path>.tmp`, then either discards it when `path`
/// already holds the same bytes or renames it over `path`.
///
/// Returns whether the existing file was identical.
fn write_if_changed(path: &Path, source: &str) -> io::Result<bool> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, source)?;

    let same = match fs::read(path) {
        Ok(existing) => existing == source.as_bytes(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
    };

    if same {
        fs::remove_file(&tmp)?;
    } else {
        fs::rename(&tmp, path)?;
    }
    Ok(same)
}
