//! Device intrinsic recognition
//!
//! Calls are dispatched here first: a callee whose name matches an entry in
//! this table never becomes a `Call` node but lowers to the dedicated IR
//! value instead.

use vega_ir::{
    AtomicKind, BarrierScope, BinaryArithKind, Dim, IntrinsicQuery, ShuffleMode, UnaryArithKind,
};

/// An intrinsic recognized by callee name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intrinsic {
    /// Grid/group/lane query; no arguments.
    Query(IntrinsicQuery),
    /// Group-wide execution barrier; no arguments.
    Barrier,
    /// Device-scope memory barrier; no arguments.
    MemoryBarrier(BarrierScope),
    /// Warp shuffle; arguments (value, origin).
    Shuffle(ShuffleMode),
    /// Atomic RMW on a view element; arguments (view, index, value).
    Atomic(AtomicKind),
    /// Atomic compare-and-swap; arguments (view, index, compare, value).
    AtomicCas,
    /// Float math with one argument.
    MathUnary(UnaryArithKind),
    /// Float math with two arguments.
    MathBinary(BinaryArithKind),
}

/// Look an intrinsic up by callee name.
pub fn resolve(name: &str) -> Option<Intrinsic> {
    use Intrinsic::*;
    let intrinsic = match name {
        "grid_index_x" => Query(IntrinsicQuery::GridIndex(Dim::X)),
        "grid_index_y" => Query(IntrinsicQuery::GridIndex(Dim::Y)),
        "grid_index_z" => Query(IntrinsicQuery::GridIndex(Dim::Z)),
        "grid_dim_x" => Query(IntrinsicQuery::GridDim(Dim::X)),
        "grid_dim_y" => Query(IntrinsicQuery::GridDim(Dim::Y)),
        "grid_dim_z" => Query(IntrinsicQuery::GridDim(Dim::Z)),
        "group_index_x" => Query(IntrinsicQuery::GroupIndex(Dim::X)),
        "group_index_y" => Query(IntrinsicQuery::GroupIndex(Dim::Y)),
        "group_index_z" => Query(IntrinsicQuery::GroupIndex(Dim::Z)),
        "group_dim_x" => Query(IntrinsicQuery::GroupDim(Dim::X)),
        "group_dim_y" => Query(IntrinsicQuery::GroupDim(Dim::Y)),
        "group_dim_z" => Query(IntrinsicQuery::GroupDim(Dim::Z)),
        "lane_id" => Query(IntrinsicQuery::LaneId),

        "barrier" => Barrier,
        "memory_barrier" => MemoryBarrier(BarrierScope::Device),
        "memory_barrier_group" => MemoryBarrier(BarrierScope::Group),
        "memory_barrier_system" => MemoryBarrier(BarrierScope::System),

        "shuffle" => Shuffle(ShuffleMode::Idx),
        "shuffle_up" => Shuffle(ShuffleMode::Up),
        "shuffle_down" => Shuffle(ShuffleMode::Down),
        "shuffle_xor" => Shuffle(ShuffleMode::Xor),

        "atomic_add" => Atomic(AtomicKind::Add),
        "atomic_and" => Atomic(AtomicKind::And),
        "atomic_or" => Atomic(AtomicKind::Or),
        "atomic_xor" => Atomic(AtomicKind::Xor),
        "atomic_min" => Atomic(AtomicKind::Min),
        "atomic_max" => Atomic(AtomicKind::Max),
        "atomic_exchange" => Atomic(AtomicKind::Exchange),
        "atomic_cas" => AtomicCas,

        "sqrt" => MathUnary(UnaryArithKind::Sqrt),
        "rsqrt" => MathUnary(UnaryArithKind::Rsqrt),
        "sin" => MathUnary(UnaryArithKind::Sin),
        "cos" => MathUnary(UnaryArithKind::Cos),
        "tanh" => MathUnary(UnaryArithKind::Tanh),
        "exp" => MathUnary(UnaryArithKind::Exp),
        "exp2" => MathUnary(UnaryArithKind::Exp2),
        "log" => MathUnary(UnaryArithKind::Log),
        "log2" => MathUnary(UnaryArithKind::Log2),
        "floor" => MathUnary(UnaryArithKind::Floor),
        "ceil" => MathUnary(UnaryArithKind::Ceiling),
        "pow" => MathBinary(BinaryArithKind::Pow),
        "atan2" => MathBinary(BinaryArithKind::Atan2),
        "copysign" => MathBinary(BinaryArithKind::CopySign),

        _ => return None,
    };
    Some(intrinsic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_names() {
        assert_eq!(
            resolve("grid_index_x"),
            Some(Intrinsic::Query(IntrinsicQuery::GridIndex(Dim::X)))
        );
        assert_eq!(resolve("lane_id"), Some(Intrinsic::Query(IntrinsicQuery::LaneId)));
        assert_eq!(resolve("not_an_intrinsic"), None);
    }

    #[test]
    fn test_atomic_names() {
        assert_eq!(resolve("atomic_add"), Some(Intrinsic::Atomic(AtomicKind::Add)));
        assert_eq!(resolve("atomic_cas"), Some(Intrinsic::AtomicCas));
    }
}
