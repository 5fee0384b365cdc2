//! End-to-end code generation tests: bytecode -> IR -> pipeline -> text.

use std::collections::HashMap;

use pretty_assertions::assert_eq;

use vega_common::MethodHandle;
use vega_frontend::{
    BinOp, BytecodeMethod, BytecodeMethodFlags, BytecodeResolver, BytecodeType, CmpOp, Frontend,
    Literal, OpCode, ScalarType,
};
use vega_backends::{OpenClBackend, PtxBackend};
use vega_ir::{
    verify_method, IrContext, KernelSpecialization, MethodId, PassPipeline, TargetAbi,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct MapResolver {
    methods: HashMap<u64, BytecodeMethod>,
}

impl MapResolver {
    fn add(&mut self, method: BytecodeMethod) {
        self.methods.insert(method.handle.token, method);
    }
}

impl BytecodeResolver for MapResolver {
    fn resolve(&self, token: u64) -> Option<&BytecodeMethod> {
        self.methods.get(&token)
    }
}

fn scalar_add_resolver() -> MapResolver {
    let mut resolver = MapResolver::default();
    resolver.add(BytecodeMethod {
        handle: MethodHandle::new(1, "VectorAdd"),
        param_types: vec![
            BytecodeType::Scalar(ScalarType::I32),
            BytecodeType::View(ScalarType::I32),
            BytecodeType::View(ScalarType::I32),
            BytecodeType::View(ScalarType::I32),
        ],
        return_type: BytecodeType::Void,
        local_types: vec![],
        code: vec![
            OpCode::LoadArg(3),
            OpCode::LoadArg(0),
            OpCode::LoadArg(1),
            OpCode::LoadArg(0),
            OpCode::LoadElement,
            OpCode::LoadArg(2),
            OpCode::LoadArg(0),
            OpCode::LoadElement,
            OpCode::Binary {
                op: BinOp::Add,
                unsigned: false,
            },
            OpCode::StoreElement,
            OpCode::Return,
        ],
        flags: BytecodeMethodFlags::default(),
    });
    resolver
}

fn compile(resolver: &MapResolver, token: u64) -> (IrContext, MethodId) {
    let mut context = IrContext::new();
    let method = Frontend::new(resolver).compile(&mut context, token).unwrap();
    let pipeline = PassPipeline::standard(KernelSpecialization::default());
    pipeline.run(&mut context, method).unwrap();
    verify_method(&context, method).unwrap();
    (context, method)
}

#[test]
fn test_scalar_add_ptx_shape() {
    init_logging();
    let resolver = scalar_add_resolver();
    let (context, method) = compile(&resolver, 1);
    let backend = PtxBackend::new(TargetAbi::ptx(), KernelSpecialization::default());
    let kernel = backend.emit_kernel(&context, method).unwrap();

    assert_eq!(kernel.symbol, "ILGPUKernel1");
    assert!(kernel.text.contains(".visible .entry ILGPUKernel1"));
    assert_eq!(kernel.text.matches("ld.global.u32").count(), 2, "{}", kernel.text);
    assert_eq!(kernel.text.matches("add.s32").count(), 1, "{}", kernel.text);
    assert_eq!(kernel.text.matches("st.global.u32").count(), 1, "{}", kernel.text);
    assert!(!kernel.text.contains("call"), "{}", kernel.text);
    assert!(!kernel.text.contains("bra "), "{}", kernel.text);
}

#[test]
fn test_scalar_add_opencl_shape() {
    init_logging();
    let resolver = scalar_add_resolver();
    let (context, method) = compile(&resolver, 1);
    let backend = OpenClBackend::new(TargetAbi::opencl(), KernelSpecialization::default());
    let kernel = backend.emit_kernel(&context, method).unwrap();

    assert_eq!(kernel.symbol, "ILGPUKernel");
    assert!(kernel.text.contains("__kernel void ILGPUKernel("));
    // Views split into a pointer and a length.
    assert!(kernel.text.contains("__global int*"), "{}", kernel.text);
    assert!(kernel.text.contains("return;"), "{}", kernel.text);
}

#[test]
fn test_emission_is_deterministic() {
    init_logging();
    let emit_once = || {
        let resolver = scalar_add_resolver();
        let (context, method) = compile(&resolver, 1);
        let ptx = PtxBackend::new(TargetAbi::ptx(), KernelSpecialization::default())
            .emit_kernel(&context, method)
            .unwrap();
        let opencl = OpenClBackend::new(TargetAbi::opencl(), KernelSpecialization::default())
            .emit_kernel(&context, method)
            .unwrap();
        (ptx.text, opencl.text)
    };
    let (ptx_a, cl_a) = emit_once();
    let (ptx_b, cl_b) = emit_once();
    assert_eq!(ptx_a, ptx_b);
    assert_eq!(cl_a, cl_b);
}

#[test]
fn test_diamond_kernel_opencl_uses_goto_and_phi_vars() {
    init_logging();
    let mut resolver = MapResolver::default();
    resolver.add(BytecodeMethod {
        handle: MethodHandle::new(1, "Clamp"),
        param_types: vec![
            BytecodeType::Scalar(ScalarType::I32),
            BytecodeType::View(ScalarType::I32),
        ],
        return_type: BytecodeType::Void,
        local_types: vec![BytecodeType::Scalar(ScalarType::I32)],
        code: vec![
            // if (x > 0) k = x; else k = 0 - x; out[0] = k;
            OpCode::LoadArg(0),
            OpCode::Const(Literal::I32(0)),
            OpCode::Compare {
                op: CmpOp::Gt,
                unsigned: false,
            },
            OpCode::BranchIfNot(7),
            OpCode::LoadArg(0),
            OpCode::StoreLocal(0),
            OpCode::Branch(11),
            OpCode::Const(Literal::I32(0)),
            OpCode::LoadArg(0),
            OpCode::Binary {
                op: BinOp::Sub,
                unsigned: false,
            },
            OpCode::StoreLocal(0),
            // 11: join
            OpCode::LoadArg(1),
            OpCode::Const(Literal::I32(0)),
            OpCode::LoadLocal(0),
            OpCode::StoreElement,
            OpCode::Return,
        ],
        flags: BytecodeMethodFlags::default(),
    });

    let (context, method) = compile(&resolver, 1);
    let backend = OpenClBackend::new(TargetAbi::opencl(), KernelSpecialization::default());
    let kernel = backend.emit_kernel(&context, method).unwrap();
    assert!(kernel.text.contains("goto BB"), "{}", kernel.text);
    assert!(kernel.text.contains("if ("), "{}", kernel.text);
}

#[test]
fn test_device_function_call_in_ptx() {
    init_logging();
    let mut resolver = MapResolver::default();
    resolver.add(BytecodeMethod {
        handle: MethodHandle::new(2, "Scale"),
        param_types: vec![BytecodeType::Scalar(ScalarType::I32)],
        return_type: BytecodeType::Scalar(ScalarType::I32),
        local_types: vec![],
        code: vec![
            OpCode::LoadArg(0),
            OpCode::Const(Literal::I32(3)),
            OpCode::Binary {
                op: BinOp::Mul,
                unsigned: false,
            },
            OpCode::Return,
        ],
        flags: BytecodeMethodFlags {
            no_inlining: true,
            ..Default::default()
        },
    });
    resolver.add(BytecodeMethod {
        handle: MethodHandle::new(1, "Apply"),
        param_types: vec![
            BytecodeType::Scalar(ScalarType::I32),
            BytecodeType::View(ScalarType::I32),
        ],
        return_type: BytecodeType::Void,
        local_types: vec![],
        code: vec![
            OpCode::LoadArg(1),
            OpCode::LoadArg(0),
            OpCode::LoadArg(0),
            OpCode::Call { token: 2 },
            OpCode::StoreElement,
            OpCode::Return,
        ],
        flags: BytecodeMethodFlags::default(),
    });

    let (context, method) = compile(&resolver, 1);
    let backend = PtxBackend::new(TargetAbi::ptx(), KernelSpecialization::default());
    let kernel = backend.emit_kernel(&context, method).unwrap();
    assert!(kernel.text.contains(".func"), "{}", kernel.text);
    assert!(kernel.text.contains("fn2_Scale"), "{}", kernel.text);
    assert!(kernel.text.contains("call.uni"), "{}", kernel.text);
    assert!(kernel.text.contains("st.param"), "{}", kernel.text);
    assert!(kernel.text.contains("ld.param"), "{}", kernel.text);
}

#[test]
fn test_pinned_group_size_directives() {
    init_logging();
    let resolver = scalar_add_resolver();
    let (context, method) = compile(&resolver, 1);
    let specialization = KernelSpecialization::default().with_group_size(256);

    let ptx = PtxBackend::new(TargetAbi::ptx(), specialization)
        .emit_kernel(&context, method)
        .unwrap();
    assert!(ptx.text.contains(".reqntid 256, 1, 1"), "{}", ptx.text);

    let opencl = OpenClBackend::new(TargetAbi::opencl(), specialization)
        .emit_kernel(&context, method)
        .unwrap();
    assert!(
        opencl.text.contains("reqd_work_group_size(256, 1, 1)"),
        "{}",
        opencl.text
    );
}
