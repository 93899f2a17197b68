//! Mapping of signal types to packed SystemVerilog types.

use indexmap::IndexMap;

use crate::dtype::{DataType, StructType};
use crate::error::TranslationError;

/// Struct typedefs needed by one output file, in first-use order with
/// nested structs ahead of the structs that contain them.
#[derive(Debug, Default)]
pub(crate) struct StructRegistry {
    defs: IndexMap<String, (StructType, String)>,
}

impl StructRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers every struct reachable from `ty`. `path` names the signal
    /// for error messages.
    pub(crate) fn register(&mut self, ty: &DataType, path: &str) -> Result<(), TranslationError> {
        match ty {
            DataType::Vector(_) => Ok(()),
            DataType::Int => Err(TranslationError::UnsupportedType {
                ty: ty.to_string(),
                path: path.to_string(),
            }),
            DataType::Array { elem, .. } => self.register(elem, path),
            DataType::Struct(st) => {
                if let Some((existing, _)) = self.defs.get(&st.name) {
                    if existing != st {
                        return Err(TranslationError::StructConflict {
                            name: st.name.clone(),
                        });
                    }
                    return Ok(());
                }
                super::check_identifier(&st.name, path)?;

                let mut body = String::new();
                for field in &st.fields {
                    let field_path = format!("{path}.{}", field.name);
                    super::check_identifier(&field.name, &field_path)?;
                    self.register(&field.ty, &field_path)?;
                    body.push_str(&format!("  {};\n", declaration(&field.ty, &field.name)));
                }
                let text = format!("typedef struct packed {{\n{body}}} {};\n", st.name);
                self.defs.insert(st.name.clone(), (st.clone(), text));
                Ok(())
            }
        }
    }

    pub(crate) fn typedefs(&self) -> impl Iterator<Item = &str> {
        self.defs.values().map(|(_, text)| text.as_str())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

fn packed_range(width: u32) -> String {
    format!("[{}:0]", width.saturating_sub(1))
}

/// Renders `ty name`, e.g. `logic [7:0] data` or `Pair [3:0] pairs`.
///
/// Types must have been registered first; `Int` never reaches here.
pub(crate) fn declaration(ty: &DataType, name: &str) -> String {
    format!("{} {name}", type_name(ty))
}

pub(crate) fn type_name(ty: &DataType) -> String {
    match ty {
        DataType::Vector(1) | DataType::Int => "logic".to_string(),
        DataType::Vector(width) => format!("logic {}", packed_range(*width)),
        DataType::Struct(st) => st.name.clone(),
        DataType::Array { elem, dims } => {
            let dims: String = dims.iter().map(|d| packed_range(*d)).collect();
            match elem.as_ref() {
                DataType::Vector(1) => format!("logic {dims}"),
                DataType::Vector(width) => format!("logic {dims}{}", packed_range(*width)),
                other => format!("{} {dims}", type_name(other)),
            }
        }
    }
}
