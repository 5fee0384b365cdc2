//! Textual IR dump
//!
//! A stable, human-readable rendering of methods used by tests and
//! diagnostics. Values print as `%<id>`, types in lowercase canonical form
//! (`i32`, `ptr<global, i8>`, `view<global, f32>`, `struct{i32,i64}`),
//! constants inline as `const(<literal>)`.

use std::fmt::Write;

use crate::block::BlockId;
use crate::context::IrContext;
use crate::method::MethodId;
use crate::types::{TypeId, TypeKind};
use crate::value::{IntrinsicQuery, ValueId, ValueKind};
use crate::value::ArithFlags;

/// Canonical lowercase rendering of a type.
pub fn type_to_string(context: &IrContext, ty: TypeId) -> String {
    match context.type_kind(ty) {
        TypeKind::Primitive(prim) => prim.to_string(),
        TypeKind::Pointer { element, space } => {
            format!("ptr<{}, {}>", space, type_to_string(context, *element))
        }
        TypeKind::View { element, space } => {
            format!("view<{}, {}>", space, type_to_string(context, *element))
        }
        TypeKind::Array { element, dimensions } => {
            format!("array<{}, {}>", type_to_string(context, *element), dimensions)
        }
        TypeKind::Structure { fields } => {
            let fields: Vec<String> = fields
                .iter()
                .map(|field| type_to_string(context, *field))
                .collect();
            format!("struct{{{}}}", fields.join(","))
        }
    }
}

/// Render a whole method in the dump format.
pub fn dump_method(context: &IrContext, method: MethodId) -> String {
    let mut out = String::new();
    let method_data = context.method(method);

    let params: Vec<String> = method_data
        .params
        .iter()
        .enumerate()
        .map(|(index, param)| {
            format!(
                "param{} : {}",
                index,
                type_to_string(context, context.value(*param).ty)
            )
        })
        .collect();
    let _ = writeln!(
        out,
        "{}({}) -> {}",
        method_data.name(),
        params.join(", "),
        type_to_string(context, method_data.declaration.return_type)
    );

    for block in &method_data.blocks {
        let _ = writeln!(out, "{}:", block_label(context, method, *block));
        for value in &context.block(*block).values {
            if let Some(line) = value_line(context, method, *value) {
                let _ = writeln!(out, "  {}", line);
            }
        }
    }
    out
}

/// Label of a block, numbered by position within its method so dumps are
/// independent of context-global block ids.
fn block_label(context: &IrContext, method: MethodId, block: BlockId) -> String {
    let position = context
        .method(method)
        .blocks
        .iter()
        .position(|b| *b == block);
    match position {
        Some(index) => format!("BB{}", index),
        None => format!("BB?{}", block.0),
    }
}

/// Inline rendering of an operand.
fn operand_to_string(context: &IrContext, value: ValueId) -> String {
    match &context.value(value).kind {
        ValueKind::Constant(literal) => format!("const({})", literal),
        ValueKind::Null => "null".to_string(),
        ValueKind::Poison => "poison".to_string(),
        ValueKind::StringConstant(text) => format!("\"{}\"", text.escape_default()),
        ValueKind::SizeOf(ty) => format!("sizeof({})", type_to_string(context, *ty)),
        _ => value.to_string(),
    }
}

/// One dump line for a value, or `None` for literals rendered inline.
fn value_line(context: &IrContext, method: MethodId, id: ValueId) -> Option<String> {
    let value = context.value(id);
    let operand = |index: usize| operand_to_string(context, value.operands[index]);
    let operands = || -> String {
        value
            .operands
            .iter()
            .map(|op| operand_to_string(context, *op))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let unsigned_suffix = |flags: &ArithFlags| {
        if flags.contains(ArithFlags::UNSIGNED) {
            ".u"
        } else {
            ""
        }
    };

    let text = match &value.kind {
        // Literals never get their own line.
        ValueKind::Constant(_)
        | ValueKind::Null
        | ValueKind::Poison
        | ValueKind::StringConstant(_)
        | ValueKind::SizeOf(_)
        | ValueKind::Parameter { .. } => return None,

        ValueKind::UnaryArith { op, flags } => {
            format!("{}{} {}", op.mnemonic(), unsigned_suffix(flags), operand(0))
        }
        ValueKind::BinaryArith { op, flags } => format!(
            "{}{} {}, {}",
            op.mnemonic(),
            unsigned_suffix(flags),
            operand(0),
            operand(1)
        ),
        ValueKind::TernaryArith { op, .. } => {
            format!("{} {}, {}, {}", op.mnemonic(), operand(0), operand(1), operand(2))
        }
        ValueKind::Compare { kind, flags } => {
            let unordered = if flags.contains(ArithFlags::UNORDERED) {
                ".un"
            } else {
                ""
            };
            format!(
                "cmp.{}{}{} {}, {}",
                kind.mnemonic(),
                unsigned_suffix(flags),
                unordered,
                operand(0),
                operand(1)
            )
        }
        ValueKind::Convert { .. } => format!("conv {}", operand(0)),
        ValueKind::PointerCast => format!("ptrcast {}", operand(0)),
        ValueKind::BitCast => format!("bitcast {}", operand(0)),
        ValueKind::Load => format!("ld {}", operand(0)),
        ValueKind::Store => format!("st {}, {}", operand(0), operand(1)),
        ValueKind::Alloca { space } => format!("alloca.{}", space),
        ValueKind::MemoryBarrier { scope } => format!("membar.{:?}", scope).to_lowercase(),
        ValueKind::LoadElementAddress => format!("elemaddr {}, {}", operand(0), operand(1)),
        ValueKind::GetField { index } => format!("getfield.{} {}", index, operand(0)),
        ValueKind::SetField { index } => {
            format!("setfield.{} {}, {}", index, operand(0), operand(1))
        }
        ValueKind::LoadFieldAddress { index } => format!("fieldaddr.{} {}", index, operand(0)),
        ValueKind::AtomicRmw { op, .. } => {
            format!("atomic.{} {}, {}", op.mnemonic(), operand(0), operand(1))
        }
        ValueKind::AtomicCas => format!(
            "atomic.cas {}, {}, {}",
            operand(0),
            operand(1),
            operand(2)
        ),
        ValueKind::Branch { target } => {
            format!("br {}", block_label(context, method, *target))
        }
        ValueKind::ConditionalBranch {
            true_target,
            false_target,
        } => format!(
            "condbr {}, {}, {}",
            operand(0),
            block_label(context, method, *true_target),
            block_label(context, method, *false_target)
        ),
        ValueKind::Switch { targets, default } => {
            let labels: Vec<String> = targets
                .iter()
                .map(|target| block_label(context, method, *target))
                .collect();
            format!(
                "switch {}, [{}], {}",
                operand(0),
                labels.join(", "),
                block_label(context, method, *default)
            )
        }
        ValueKind::Return => {
            if value.operands.is_empty() {
                "ret".to_string()
            } else {
                format!("ret {}", operand(0))
            }
        }
        ValueKind::Phi { incoming } => {
            let edges: Vec<String> = incoming
                .iter()
                .zip(value.operands.iter())
                .map(|(block, operand)| {
                    format!(
                        "{}: {}",
                        block_label(context, method, *block),
                        operand_to_string(context, *operand)
                    )
                })
                .collect();
            format!("phi [{}]", edges.join(", "))
        }
        ValueKind::Call { target } => {
            format!("call {}({})", context.method(*target).name(), operands())
        }
        ValueKind::Query(query) => query_mnemonic(*query),
        ValueKind::WarpShuffle { mode, width } => {
            format!("shfl.{}.{} {}, {}", mode.mnemonic(), width, operand(0), operand(1))
        }
        ValueKind::Barrier => "barrier".to_string(),
    };

    // Void results print bare; everything else binds a name.
    let is_void = value.ty == context.void_type();
    if is_void {
        Some(text)
    } else {
        Some(format!(
            "{} : {} = {}",
            value.id,
            type_to_string(context, value.ty),
            text
        ))
    }
}

fn query_mnemonic(query: IntrinsicQuery) -> String {
    match query {
        IntrinsicQuery::GridIndex(dim) => format!("grid.idx.{}", dim.letter()),
        IntrinsicQuery::GridDim(dim) => format!("grid.dim.{}", dim.letter()),
        IntrinsicQuery::GroupIndex(dim) => format!("group.idx.{}", dim.letter()),
        IntrinsicQuery::GroupDim(dim) => format!("group.dim.{}", dim.letter()),
        IntrinsicQuery::LaneId => "lane.id".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::MethodDeclaration;
    use crate::types::{AddressSpace, PrimitiveType};
    use crate::value::{ArithFlags, BinaryArithKind};
    use pretty_assertions::assert_eq;
    use vega_common::MethodHandle;

    #[test]
    fn test_type_strings() {
        let mut context = IrContext::new();
        let i8_ty = context.primitive_type(PrimitiveType::Int8);
        let f32_ty = context.primitive_type(PrimitiveType::Float32);
        let i64_ty = context.primitive_type(PrimitiveType::Int64);
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let ptr = context.pointer_type(i8_ty, AddressSpace::Global);
        let view = context.view_type(f32_ty, AddressSpace::Global);
        let st = context.structure_type(vec![i32_ty, i64_ty]);

        assert_eq!(type_to_string(&context, ptr), "ptr<global, i8>");
        assert_eq!(type_to_string(&context, view), "view<global, f32>");
        assert_eq!(type_to_string(&context, st), "struct{i32,i64}");
    }

    #[test]
    fn test_dump_straight_line_method() {
        let mut context = IrContext::new();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let decl =
            MethodDeclaration::new(MethodHandle::new(1, "Sum"), i32_ty, vec![i32_ty, i32_ty]);
        let method = context.create_method(decl).unwrap();
        {
            let mut builder = context.create_builder(method).unwrap();
            let entry = builder.create_block();
            let exit = builder.create_block();
            builder.set_insert_point(entry);
            let lhs = builder.param(0);
            let rhs = builder.param(1);
            let sum = builder
                .binary(BinaryArithKind::Add, ArithFlags::empty(), lhs, rhs)
                .unwrap();
            let seven = builder.int32(7);
            let scaled = builder
                .binary(BinaryArithKind::Mul, ArithFlags::empty(), sum, seven)
                .unwrap();
            builder.branch(exit);
            builder.set_insert_point(exit);
            builder.ret(Some(scaled));
        }

        let text = dump_method(&context, method);
        assert_eq!(
            text,
            "Sum(param0 : i32, param1 : i32) -> i32\n\
             BB0:\n\
             \x20\x20%2 : i32 = add %0, %1\n\
             \x20\x20%4 : i32 = mul %2, const(7:i32)\n\
             \x20\x20br BB1\n\
             BB1:\n\
             \x20\x20ret %4\n"
        );
    }
}
