//! Property tests: scalar returns land unchanged in the single SoA output.

use inkwell::context::Context;
use inkwell::OptimizationLevel;
use proptest::prelude::*;
use soawrap::{
    compile_function, soa_wrap_function, BuildOptions, Codegen, CompilerLock, SemanticType,
    Signature,
};

/// Compile `scale(x) = x * factor` for one scalar kind and call its wrapper.
macro_rules! scaled_through_wrapper {
    ($fn_name:ident, $ty:expr, $rust:ty, |$body:ident, $x:ident| $emit:expr) => {
        fn $fn_name(input: $rust) -> $rust {
            let session = CompilerLock::global().acquire();
            let context = Context::create();
            let options = BuildOptions::native(OptimizationLevel::None);
            let codegen = Codegen::new(&context, options).unwrap();

            let signature = Signature::new($ty, vec![$ty]);
            let compiled = compile_function(&session, &codegen, "scale", signature, &[], |$body| {
                let $x = $body.args()[0];
                Ok($emit)
            })
            .unwrap();

            let wrapped = soa_wrap_function(&session, &compiled.library, &compiled.fndesc).unwrap();
            let native = wrapped.linked_module().unwrap();
            let engine = native
                .create_jit_execution_engine(OptimizationLevel::None)
                .unwrap();

            let mut out: $rust = Default::default();
            unsafe {
                let scale = engine
                    .get_function::<unsafe extern "C" fn(*mut $rust, $rust)>("scale")
                    .unwrap();
                scale.call(&mut out, input);
            }
            out
        }
    };
}

scaled_through_wrapper!(scale_i64, SemanticType::int(64), i64, |body, x| {
    let three = body.context().i64_type().const_int(3, false);
    body.builder().build_int_mul(x.into_int_value(), three, "r")?.into()
});

scaled_through_wrapper!(scale_u16, SemanticType::uint(16), u16, |body, x| {
    let three = body.context().i16_type().const_int(3, false);
    body.builder().build_int_mul(x.into_int_value(), three, "r")?.into()
});

scaled_through_wrapper!(scale_f32, SemanticType::float32(), f32, |body, x| {
    let half = body.context().f32_type().const_float(0.5);
    body.builder().build_float_mul(x.into_float_value(), half, "r")?.into()
});

scaled_through_wrapper!(scale_f64, SemanticType::float64(), f64, |body, x| {
    let half = body.context().f64_type().const_float(0.5);
    body.builder().build_float_mul(x.into_float_value(), half, "r")?.into()
});

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_int64_scalar_output(x in any::<i64>()) {
        prop_assert_eq!(scale_i64(x), x.wrapping_mul(3));
    }

    #[test]
    fn prop_uint16_scalar_output(x in any::<u16>()) {
        prop_assert_eq!(scale_u16(x), x.wrapping_mul(3));
    }

    #[test]
    fn prop_float32_scalar_output(x in -1.0e6f32..1.0e6f32) {
        prop_assert_eq!(scale_f32(x), x * 0.5);
    }

    #[test]
    fn prop_float64_scalar_output(x in -1.0e12f64..1.0e12f64) {
        prop_assert_eq!(scale_f64(x), x * 0.5);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Output arity follows the tuple length for any homogeneous tuple.
    #[test]
    fn prop_uni_tuple_arity(count in 1usize..12) {
        let _session = CompilerLock::global().acquire();
        let context = Context::create();
        let codegen = Codegen::new(&context, BuildOptions::default()).unwrap();
        let model = codegen.data_model();
        let soa = soawrap::CallConv::new(soawrap::ConventionKind::StructureOfArrays, model);

        let restype = SemanticType::uni_tuple(SemanticType::float64(), count);
        let signature = soa.native_signature(&restype, &[SemanticType::int32()]).unwrap();
        prop_assert_eq!(signature.return_arity(), count);
        prop_assert!(signature.ret.is_none());
        prop_assert_eq!(signature.fn_type(&context).count_param_types() as usize, count + 1);
    }
}
