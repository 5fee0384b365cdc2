//! Transformation passes over method IR
//!
//! Every pass runs through a [`MethodBuilder`] and reports whether it
//! changed the IR. The [`PassPipeline`] drives the mandatory pass order to
//! a fixed point, bounded by an iteration cap.

use log::debug;

use vega_common::Result;

use crate::builder::MethodBuilder;
use crate::context::IrContext;
use crate::method::MethodId;

mod dce;
mod fold_pass;
mod inline;
mod mem2reg;
mod simplify_cfg;
mod specialize;

pub use dce::DeadCodeElim;
pub use fold_pass::ConstantFolder;
pub use inline::Inliner;
pub use mem2reg::Mem2Reg;
pub use simplify_cfg::SimplifyCfg;
pub use specialize::{KernelSpecialization, SpecializationFlags, Specializer};

/// Outcome of one pass run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassResult {
    Changed,
    Unchanged,
}

impl PassResult {
    pub fn changed(self) -> bool {
        self == PassResult::Changed
    }

    pub fn from_flag(changed: bool) -> Self {
        if changed {
            PassResult::Changed
        } else {
            PassResult::Unchanged
        }
    }
}

/// A rewrite over one method's IR.
pub trait Pass {
    fn name(&self) -> &'static str;

    fn run(&self, builder: &mut MethodBuilder<'_>) -> Result<PassResult>;
}

/// Runs the mandatory pass order to a fixed point.
pub struct PassPipeline {
    passes: Vec<Box<dyn Pass>>,
    max_iterations: usize,
}

impl PassPipeline {
    pub const DEFAULT_MAX_ITERATIONS: usize = 16;

    /// The mandatory pipeline, in order.
    pub fn standard(specialization: KernelSpecialization) -> Self {
        Self {
            passes: vec![
                Box::new(Inliner::default()),
                Box::new(SimplifyCfg),
                Box::new(ConstantFolder),
                Box::new(DeadCodeElim),
                Box::new(Mem2Reg),
                Box::new(Specializer::new(specialization)),
            ],
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Transform a method to its fixed point.
    ///
    /// A method already carrying the transformed flag is skipped. Passes
    /// never partially commit: the first error aborts the pipeline and the
    /// caller discards the method.
    pub fn run(&self, context: &mut IrContext, method: MethodId) -> Result<()> {
        if context.method(method).is_transformed() {
            return Ok(());
        }
        for iteration in 0..self.max_iterations {
            let mut changed = false;
            for pass in &self.passes {
                let mut builder = context.create_builder(method)?;
                let result = pass.run(&mut builder)?;
                drop(builder);
                if result.changed() {
                    debug!(
                        "pass {} changed {} (iteration {})",
                        pass.name(),
                        context.method(method).name(),
                        iteration
                    );
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        context.method_mut(method).mark_transformed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::MethodDeclaration;
    use crate::types::PrimitiveType;
    use crate::value::{ArithFlags, BinaryArithKind, ValueKind};
    use vega_common::MethodHandle;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        init_logging();
        let mut context = IrContext::new();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let decl = MethodDeclaration::new(MethodHandle::new(1, "k"), i32_ty, vec![i32_ty]);
        let method = context.create_method(decl).unwrap();
        {
            let mut builder = context.create_builder(method).unwrap();
            builder.create_block();
            let x = builder.param(0);
            let one = builder.int32(1);
            let sum = builder
                .binary(BinaryArithKind::Add, ArithFlags::empty(), x, one)
                .unwrap();
            builder.ret(Some(sum));
        }

        let pipeline = PassPipeline::standard(KernelSpecialization::default());
        pipeline.run(&mut context, method).unwrap();
        assert!(context.method(method).is_transformed());
        let first = crate::dump::dump_method(&context, method);

        // Second run skips (transformed) and leaves the text unchanged.
        pipeline.run(&mut context, method).unwrap();
        let second = crate::dump::dump_method(&context, method);
        assert_eq!(first, second);

        // Even when forced dirty, the pipeline reaches the same fixpoint.
        context.method_mut(method).mark_dirty();
        pipeline.run(&mut context, method).unwrap();
        let third = crate::dump::dump_method(&context, method);
        assert_eq!(first, third);
    }

    #[test]
    fn test_constant_expression_reduces_to_return() {
        init_logging();
        let mut context = IrContext::new();
        let i32_ty = context.primitive_type(PrimitiveType::Int32);
        let decl = MethodDeclaration::new(MethodHandle::new(1, "k"), i32_ty, vec![]);
        let method = context.create_method(decl).unwrap();
        {
            let mut builder = context.create_builder(method).unwrap();
            builder.create_block();
            // (5 + 3) * 2 folds at creation already; the pipeline removes
            // the dead intermediates.
            let five = builder.int32(5);
            let three = builder.int32(3);
            let sum = builder
                .binary(BinaryArithKind::Add, ArithFlags::empty(), five, three)
                .unwrap();
            let two = builder.int32(2);
            let product = builder
                .binary(BinaryArithKind::Mul, ArithFlags::empty(), sum, two)
                .unwrap();
            builder.ret(Some(product));
        }
        let pipeline = PassPipeline::standard(KernelSpecialization::default());
        pipeline.run(&mut context, method).unwrap();

        // A single block with const(16) returned.
        let entry = context.method(method).entry.unwrap();
        let values = &context.block(entry).values;
        let ret = *values.last().unwrap();
        let ret_value = context.value(ret).operands[0];
        assert!(matches!(
            context.value(ret_value).kind,
            ValueKind::Constant(crate::value::PrimitiveValue::Int32(16))
        ));
        // Everything except the constant and the return is gone.
        assert_eq!(values.len(), 2);
    }
}
