//! 二进制格式端到端测试
//!
//! 写出再读回的字节级行为，以及损坏输入的拒绝。

use xenon_module::builder::CodeBuilder;
use xenon_module::loader::LoadError;
use xenon_module::{
    write_module, Constant, FunctionRecord, Module, OpCode, UpvalueDesc, WriteOptions,
};

fn sample_module() -> Module {
    let mut main = CodeBuilder::new();
    main.write_op_u16(OpCode::PushFunc, 1, 1);
    main.write_op_u8(OpCode::Call, 0, 1);
    main.write_op(OpCode::ReturnValue, 1);
    let main_stack = main.max_stack();
    let (main_code, main_lines) = main.into_parts();

    let mut helper = CodeBuilder::new();
    helper.write_op_u16(OpCode::PushConst, 0, 3);
    helper.write_op_u16(OpCode::PushConst, 1, 3);
    helper.write_op(OpCode::Add, 3);
    helper.write_op(OpCode::ReturnValue, 4);
    let helper_stack = helper.max_stack();
    let (helper_code, helper_lines) = helper.into_parts();

    Module::new(
        vec!["greeting".to_string()],
        vec![
            Constant::Int(40),
            Constant::Int(2),
            Constant::Str("hello".to_string()),
        ],
        vec![
            FunctionRecord {
                name: "<main>".to_string(),
                arity: 0,
                local_count: 0,
                max_stack: main_stack,
                upvalues: Vec::new(),
                code: main_code,
                lines: main_lines,
            },
            FunctionRecord {
                name: "helper".to_string(),
                arity: 0,
                local_count: 0,
                max_stack: helper_stack,
                upvalues: Vec::new(),
                code: helper_code,
                lines: helper_lines,
            },
        ],
        0,
    )
}

#[test]
fn test_round_trip_preserves_everything() {
    let module = sample_module();
    let bytes = write_module(&module, WriteOptions::default()).unwrap();
    let loaded = Module::from_bytes(&bytes).unwrap();
    assert_eq!(loaded, module);
}

#[test]
fn test_payload_corruption_detected_everywhere() {
    // 头部之后的每个字节翻转一位都必须被校验和拦下
    const HEADER_SIZE: usize = 44;
    let bytes = write_module(&sample_module(), WriteOptions::default()).unwrap();
    assert!(bytes.len() > HEADER_SIZE);

    for position in HEADER_SIZE..bytes.len() {
        let mut corrupted = bytes.clone();
        corrupted[position] ^= 0x40;
        match Module::from_bytes(&corrupted) {
            Err(LoadError::CorruptModule) => {}
            other => panic!("byte {position}: expected CorruptModule, got {other:?}"),
        }
    }
}

#[test]
fn test_header_corruption_rejected() {
    let bytes = write_module(&sample_module(), WriteOptions::default()).unwrap();
    // 头部每个字节翻转也不能通过加载
    for position in 0..44 {
        let mut corrupted = bytes.clone();
        corrupted[position] ^= 0x01;
        assert!(
            Module::from_bytes(&corrupted).is_err(),
            "header byte {position} flip was accepted"
        );
    }
}

#[test]
fn test_truncation_rejected_at_every_length() {
    let bytes = write_module(&sample_module(), WriteOptions::default()).unwrap();
    for len in 0..bytes.len() {
        assert!(
            Module::from_bytes(&bytes[..len]).is_err(),
            "truncation to {len} bytes was accepted"
        );
    }
}

#[test]
fn test_strip_debug_round_trip() {
    let module = sample_module();
    let bytes = write_module(
        &module,
        WriteOptions {
            emit_debug_info: false,
        },
    )
    .unwrap();
    let loaded = Module::from_bytes(&bytes).unwrap();
    assert!(loaded.functions.iter().all(|f| f.lines.is_empty()));
    assert_eq!(loaded.constants, module.constants);
    assert_eq!(loaded.functions[1].code, module.functions[1].code);
}

#[test]
fn test_upvalue_descriptors_survive_round_trip() {
    let mut module = sample_module();
    module.functions[1].upvalues = vec![
        UpvalueDesc {
            from_parent_local: true,
            index: 0,
        },
        UpvalueDesc {
            from_parent_local: false,
            index: 3,
        },
    ];
    // helper 不再从 main 直接可调用；绕过静态校验需要 main 侧有局部槽
    module.functions[0].local_count = 1;
    module.functions[0].code = {
        let mut b = CodeBuilder::new();
        b.write_op_u16(OpCode::MakeClosure, 1, 1);
        b.write_op(OpCode::ReturnValue, 1);
        b.into_parts().0
    };
    module.functions[0].upvalues = vec![
        UpvalueDesc {
            from_parent_local: false,
            index: 0,
        },
        UpvalueDesc {
            from_parent_local: false,
            index: 1,
        },
        UpvalueDesc {
            from_parent_local: false,
            index: 2,
        },
        UpvalueDesc {
            from_parent_local: false,
            index: 3,
        },
    ];
    let bytes = write_module(&module, WriteOptions::default()).unwrap();
    let loaded = Module::from_bytes(&bytes).unwrap();
    assert_eq!(loaded.functions[1].upvalues, module.functions[1].upvalues);
}
