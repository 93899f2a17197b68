//! SystemVerilog rendering of a component subtree.
//!
//! Each component becomes one module: ports first, then local declarations,
//! continuous assignments for nets, one `always_comb`/`always_ff` block per
//! update block, and child instances. Children are rendered before their
//! parents; identical module bodies of the same kind are emitted once.

use std::collections::HashMap;
use std::fmt::Write;

use crate::block::UpdateKind;
use crate::design::Design;
use crate::error::TranslationError;
use crate::ir::{BinaryOp, IndexKind, LExpr, LStmt, SelStep, Select, UnaryOp};
use crate::registry::BlockBody;
use crate::signal::Direction;
use crate::types::{BlockId, ComponentId, NetId, SignalId};

use super::types::{self, StructRegistry};
use super::{check_identifier, sanitize};

/// Result of translating one marked component.
pub(crate) struct Rendered {
    pub source: String,
    pub top_module: String,
}

struct Emitter<'d> {
    design: &'d Design,
    structs: StructRegistry,
    modules: Vec<String>,
    by_body: HashMap<(String, String), String>,
    per_kind: HashMap<String, usize>,
    module_of: HashMap<ComponentId, String>,
}

/// Renders `top` and everything below it into one source file.
pub(crate) fn render(
    design: &Design,
    top: ComponentId,
    explicit_module_name: Option<&str>,
) -> Result<Rendered, TranslationError> {
    let mut emitter = Emitter {
        design,
        structs: StructRegistry::new(),
        modules: Vec::new(),
        by_body: HashMap::new(),
        per_kind: HashMap::new(),
        module_of: HashMap::new(),
    };
    emitter.component(top, explicit_module_name)?;
    let top_module = emitter.module_of[&top].clone();

    let mut source = String::new();
    let _ = writeln!(
        source,
        "// Translated from {} by tickhdl.",
        design.hierarchy.component_path(top)
    );
    let _ = writeln!(source, "// Top module: {top_module}");
    source.push('\n');
    if !emitter.structs.is_empty() {
        for def in emitter.structs.typedefs() {
            source.push_str(def);
            source.push('\n');
        }
    }
    source.push_str(&emitter.modules.join("\n"));

    Ok(Rendered { source, top_module })
}

impl<'d> Emitter<'d> {
    fn component(
        &mut self,
        comp: ComponentId,
        explicit_module_name: Option<&str>,
    ) -> Result<(), TranslationError> {
        let design = self.design;
        let hier = &design.hierarchy;
        for &child in &hier.component(comp).children {
            self.component(child, None)?;
        }

        let body = ModuleBody::new(self, comp)?.render()?;
        let kind = sanitize(&hier.component(comp).kind);
        check_identifier(&kind, &hier.component_path(comp))?;

        let name = match explicit_module_name {
            Some(name) => {
                check_identifier(name, &hier.component_path(comp))?;
                self.modules.push(format!("module {name}{body}"));
                name.to_string()
            }
            None => match self.by_body.get(&(kind.clone(), body.clone())) {
                Some(existing) => existing.clone(),
                None => {
                    let count = self.per_kind.entry(kind.clone()).or_insert(0);
                    let name = if *count == 0 {
                        kind.clone()
                    } else {
                        format!("{kind}__{count}")
                    };
                    *count += 1;
                    self.modules.push(format!("module {name}{body}"));
                    self.by_body.insert((kind, body), name.clone());
                    name
                }
            },
        };
        self.module_of.insert(comp, name);
        Ok(())
    }
}

/// Everything needed to render one component as a module.
struct ModuleBody<'e, 'd> {
    emitter: &'e mut Emitter<'d>,
    comp: ComponentId,
    names: HashMap<SignalId, String>,
}

impl<'e, 'd> ModuleBody<'e, 'd> {
    fn new(emitter: &'e mut Emitter<'d>, comp: ComponentId) -> Result<Self, TranslationError> {
        let design = emitter.design;
        let hier = &design.hierarchy;
        let info = hier.component(comp);
        let mut names = HashMap::new();

        for &sig in &info.signals {
            let name = sanitize(&hier.signal(sig).name);
            check_identifier(&name, &hier.signal_path(sig))?;
            names.insert(sig, name);
        }
        for &child in &info.children {
            let child_name = sanitize(&hier.component(child).name);
            check_identifier(&child_name, &hier.component_path(child))?;
            for &sig in &hier.component(child).signals {
                if hier.signal(sig).dir.is_port() {
                    let port = sanitize(&hier.signal(sig).name);
                    names.insert(sig, format!("{child_name}__{port}"));
                }
            }
        }
        Ok(Self {
            emitter,
            comp,
            names,
        })
    }

    fn design(&self) -> &'d Design {
        self.emitter.design
    }

    fn declare(&mut self, sig: SignalId, name: &str) -> Result<String, TranslationError> {
        let hier = &self.design().hierarchy;
        let ty = &hier.signal(sig).ty;
        self.emitter.structs.register(ty, &hier.signal_path(sig))?;
        Ok(types::declaration(ty, name))
    }

    /// The body of `module <name>`, starting at the port list.
    fn render(mut self) -> Result<String, TranslationError> {
        let design = self.design();
        let hier = &design.hierarchy;
        let info = hier.component(self.comp);
        let mut out = String::new();

        // Ports
        let mut ports = Vec::new();
        for &sig in &info.signals {
            let dir = match hier.signal(sig).dir {
                Direction::In => "input",
                Direction::Out => "output",
                Direction::Wire => continue,
            };
            let name = self.names[&sig].clone();
            ports.push(format!("  {dir} {}", self.declare(sig, &name)?));
        }
        let _ = writeln!(out, " (\n{}\n);", ports.join(",\n"));

        // Local wires
        let mut decls = Vec::new();
        for &sig in &info.signals {
            if hier.signal(sig).dir == Direction::Wire {
                let name = self.names[&sig].clone();
                decls.push(self.declare(sig, &name)?);
            }
        }
        for &child in &info.children {
            for &sig in &hier.component(child).signals {
                if hier.signal(sig).dir.is_port() {
                    let name = self.names[&sig].clone();
                    decls.push(self.declare(sig, &name)?);
                }
            }
        }
        for decl in &decls {
            let _ = writeln!(out, "  {decl};");
        }

        // Nets
        let assigns = self.net_assignments();
        if !assigns.is_empty() {
            out.push('\n');
            for (dst, src) in &assigns {
                let _ = writeln!(out, "  assign {dst} = {src};");
            }
        }

        // Update blocks
        for &block in &info.blocks {
            out.push('\n');
            out.push_str(&self.block(block)?);
        }

        // Instances
        for &child in &info.children {
            let child_info = hier.component(child);
            let module = &self.emitter.module_of[&child];
            let conns: Vec<String> = child_info
                .signals
                .iter()
                .filter(|s| hier.signal(**s).dir.is_port())
                .map(|s| {
                    format!(
                        "    .{}( {} )",
                        sanitize(&hier.signal(*s).name),
                        self.names[s]
                    )
                })
                .collect();
            let _ = writeln!(
                out,
                "\n  {module} {} (\n{}\n  );",
                sanitize(&child_info.name),
                conns.join(",\n")
            );
        }

        out.push_str("endmodule\n");
        Ok(out)
    }

    fn writer_is_local(&self, sig: SignalId) -> bool {
        let design = self.design();
        design.blocks.iter().enumerate().any(|(idx, blk)| {
            design.hierarchy.block(BlockId(idx)).owner == self.comp
                && blk.access.writes.contains(&sig)
        })
    }

    /// One `assign` per extra in-scope member of each net, from the member
    /// that carries the net's value inside this module.
    fn net_assignments(&self) -> Vec<(String, String)> {
        let design = self.design();
        let hier = &design.hierarchy;

        let mut by_net: HashMap<NetId, Vec<SignalId>> = HashMap::new();
        let mut in_scope: Vec<SignalId> = self.names.keys().copied().collect();
        in_scope.sort_unstable();
        for &sig in &in_scope {
            by_net.entry(design.net_of(sig)).or_default().push(sig);
        }
        let mut nets: Vec<(NetId, Vec<SignalId>)> =
            by_net.into_iter().filter(|(_, m)| m.len() > 1).collect();
        nets.sort_unstable_by_key(|(net, _)| *net);

        let rank = |sig: SignalId| -> u8 {
            let info = hier.signal(sig);
            let own = info.owner == self.comp;
            match (own, info.dir) {
                (true, Direction::In) => 0,
                (false, Direction::Out) => 1,
                (true, _) if self.writer_is_local(sig) => 2,
                (false, Direction::In) if self.writer_is_local(sig) => 3,
                _ => 4,
            }
        };

        let mut assigns = Vec::new();
        for (_, members) in nets {
            let Some(&source) = members.iter().min_by_key(|s| (rank(**s), **s)) else {
                continue;
            };
            for &sig in &members {
                if sig != source {
                    assigns.push((self.names[&sig].clone(), self.names[&source].clone()));
                }
            }
        }
        assigns
    }

    fn block(&self, block: BlockId) -> Result<String, TranslationError> {
        let design = self.design();
        let path = design.hierarchy.block_path(block);
        let registered = &design.blocks[block.index()];
        let BlockBody::Behavioral(stmts) = &registered.body else {
            return Err(TranslationError::OpaqueBlock { block: path });
        };

        let label = sanitize(&design.hierarchy.block(block).name);
        check_identifier(&label, &path)?;
        let (header, op) = match registered.kind {
            UpdateKind::Comb => ("always_comb".to_string(), "="),
            UpdateKind::Seq => {
                let clk = &self.names[&design.hierarchy.component(self.comp).clk];
                (format!("always_ff @(posedge {clk})"), "<=")
            }
        };

        let ctx = BlockRender {
            names: &self.names,
            path: &path,
            design,
            op,
        };
        let mut out = format!("  {header} begin : {label}\n");
        ctx.stmts(stmts, 2, &mut out)?;
        out.push_str("  end\n");
        Ok(out)
    }
}

struct BlockRender<'a> {
    names: &'a HashMap<SignalId, String>,
    path: &'a str,
    design: &'a Design,
    op: &'static str,
}

impl BlockRender<'_> {
    fn unsupported(&self, detail: impl Into<String>) -> TranslationError {
        TranslationError::UnsupportedExpr {
            block: self.path.to_string(),
            detail: detail.into(),
        }
    }

    fn stmts(&self, stmts: &[LStmt], depth: usize, out: &mut String) -> Result<(), TranslationError> {
        let indent = "  ".repeat(depth);
        for stmt in stmts {
            match stmt {
                LStmt::Assign { target, value } => {
                    let _ = writeln!(
                        out,
                        "{indent}{} {} {};",
                        self.select(target)?,
                        self.op,
                        self.expr(value)?
                    );
                }
                LStmt::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    let _ = writeln!(out, "{indent}if ( {} ) begin", self.expr(cond)?);
                    self.stmts(then, depth + 1, out)?;
                    if otherwise.is_empty() {
                        let _ = writeln!(out, "{indent}end");
                    } else {
                        let _ = writeln!(out, "{indent}end");
                        let _ = writeln!(out, "{indent}else begin");
                        self.stmts(otherwise, depth + 1, out)?;
                        let _ = writeln!(out, "{indent}end");
                    }
                }
            }
        }
        Ok(())
    }

    fn select(&self, sel: &Select) -> Result<String, TranslationError> {
        let mut text = match self.names.get(&sel.sig) {
            Some(name) => name.clone(),
            None => {
                return Err(TranslationError::OutOfScope {
                    block: self.path.to_string(),
                    signal: self.design.hierarchy.signal_path(sel.sig),
                })
            }
        };
        let mut after_range = false;
        for step in &sel.steps {
            if after_range {
                return Err(self.unsupported(format!("select after a part-select of {text}")));
            }
            match step {
                SelStep::Field { name, .. } => {
                    let _ = write!(text, ".{name}");
                }
                SelStep::Index { index, .. } => match index {
                    IndexKind::Static(i) => {
                        let _ = write!(text, "[{i}]");
                    }
                    IndexKind::Dynamic(expr) => {
                        let index = self.expr(expr)?;
                        let _ = write!(text, "[{index}]");
                    }
                },
                SelStep::Range { lo, width, on_array } => {
                    if *on_array {
                        return Err(self.unsupported(format!("part-select of packed array {text}")));
                    }
                    let _ = write!(text, "[{}:{lo}]", lo + width - 1);
                    after_range = true;
                }
            }
        }
        Ok(text)
    }

    fn expr(&self, expr: &LExpr) -> Result<String, TranslationError> {
        Ok(match expr {
            LExpr::Select(sel) => self.select(sel)?,
            LExpr::Const(bits) => format!("{}'h{:x}", bits.width(), bits.value()),
            LExpr::Unary { op, arg, width } => {
                let arg = self.expr(arg)?;
                match op {
                    UnaryOp::Not => format!("{width}'(~{arg})"),
                    UnaryOp::LogicNot => format!("(!{arg})"),
                    UnaryOp::ReduceAnd => format!("(&{arg})"),
                    UnaryOp::ReduceOr => format!("(|{arg})"),
                    UnaryOp::ReduceXor => format!("(^{arg})"),
                }
            }
            LExpr::Binary {
                op,
                lhs,
                rhs,
                width,
            } => {
                let (l, r) = (self.expr(lhs)?, self.expr(rhs)?);
                let sym = binary_symbol(*op);
                if op.is_predicate() {
                    format!("({l} {sym} {r})")
                } else {
                    format!("{width}'({l} {sym} {r})")
                }
            }
            LExpr::Mux {
                cond,
                then,
                otherwise,
                ..
            } => format!(
                "({} ? {} : {})",
                self.expr(cond)?,
                self.expr(then)?,
                self.expr(otherwise)?
            ),
            LExpr::Slice { .. } => {
                return Err(self.unsupported("part-select of a computed expression"));
            }
            LExpr::Concat { parts, .. } => {
                let parts = parts
                    .iter()
                    .map(|p| self.expr(p))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("{{ {} }}", parts.join(", "))
            }
            LExpr::Resize { arg, width } => format!("{width}'({})", self.expr(arg)?),
        })
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::And => "&",
        BinaryOp::Or => "|",
        BinaryOp::Xor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::LogicAnd => "&&",
        BinaryOp::LogicOr => "||",
    }
}
