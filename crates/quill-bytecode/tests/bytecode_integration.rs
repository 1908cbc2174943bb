//! Integration tests for module images, decoding and verification

use proptest::prelude::*;
use quill_bytecode::{
    decode_at, disassemble, verify_module, BytecodeWriter, Instruction, ModuleError, Region,
    ScriptModule, StringTable, VerifyError, VoiceTable, REPLY_ONCE, SPEAK_ASYNC,
};

/// A small conversation routine exercising most operand shapes
fn conversation_module() -> ScriptModule {
    let mut w = BytecodeWriter::new();

    w.emit_enter(2);
    w.emit_get_int(Region::Thread, 2);
    let to_done = w.emit_jmp_false_v(0);

    w.emit_str_lit(0);
    w.emit_speak(1, 3, SPEAK_ASYNC);

    w.emit_dialog_begin();
    w.emit_str_lit(1);
    w.emit_reply(1, 0, 0);
    w.emit_str_lit(2);
    w.emit_reply(2, REPLY_ONCE, 40);
    w.emit_dialog_end();

    // opcode + count + two cases + default
    let one = w.label() + 13;
    let two = one + 4;
    w.emit_jmp_switch(&[(1, one), (2, two)], two);
    // one:
    assert_eq!(w.label(), one);
    w.emit_const_int(10);
    w.emit_return();
    // two:
    assert_eq!(w.label(), two);
    let done = w.label();
    w.patch_u16(to_done, done);
    w.emit_return_v();

    let strings: StringTable = ["Hi there.", "Who are you?", "Goodbye."]
        .into_iter()
        .collect();

    ScriptModule::new("conversation", w.into_bytes())
        .with_statics(64, 32)
        .with_entry_point("talk", 0)
        .with_strings(strings)
        .with_voices(VoiceTable::from(vec![500]))
}

#[test]
fn test_image_roundtrip() {
    let module = conversation_module();
    let bytes = module.encode();
    let decoded = ScriptModule::decode(&bytes).expect("Failed to decode");

    assert_eq!(decoded.name, "conversation");
    assert_eq!(decoded.static_offset, 64);
    assert_eq!(decoded.strings.get(2), Some("Goodbye."));
    assert_eq!(decoded.voices.get(0), Some(500));
    assert_eq!(decoded.code, module.code);
}

#[test]
fn test_verify_conversation() {
    let summary = verify_module(&conversation_module()).expect("Should be valid");
    assert_eq!(summary.entry_points, 1);
    assert!(summary.reachable_instructions >= 12);
}

#[test]
fn test_disassembly_listing() {
    let module = conversation_module();
    let listing = disassemble(&module.code, 0).unwrap();

    assert_eq!(listing[0].instruction, Instruction::Enter(2));
    let text: Vec<String> = listing.iter().map(ToString::to_string).collect();
    assert!(text.iter().any(|line| line.contains("SPEAK actor 3")));
    assert!(text.iter().any(|line| line.contains("once static:bit40")));
    assert!(text.last().unwrap().ends_with("RETURN_V"));
}

#[test]
fn test_entry_point_outside_code_rejected() {
    let module = ScriptModule::new("broken", vec![0x1C]).with_entry_point("main", 9);
    let bytes = module.encode();

    assert!(matches!(
        ScriptModule::decode(&bytes),
        Err(ModuleError::EntryPointOutOfRange { .. })
    ));
    assert!(matches!(
        verify_module(&module),
        Err(VerifyError::ModuleValidation(_))
    ));
}

#[test]
fn test_random_table_targets_verified() {
    let mut w = BytecodeWriter::new();
    w.emit_jmp_random(&[(1, 0x0D), (1, 0x0E)]);
    // 0x0D
    w.emit_return_v();
    // 0x0E
    w.emit_return_v();

    let ok = ScriptModule::new("random", w.buffer().to_vec()).with_entry_point("main", 0);
    assert_eq!(verify_module(&ok).unwrap().reachable_instructions, 3);

    // first branch target
    w.patch_u16(7, 0x0FFF);
    let bad = ScriptModule::new("random", w.into_bytes()).with_entry_point("main", 0);
    assert!(matches!(
        verify_module(&bad),
        Err(VerifyError::InvalidJumpTarget { target: 0x0FFF, .. })
    ));
}

proptest! {
    #[test]
    fn decoding_arbitrary_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        if let Ok(decoded) = decode_at(&bytes, 0) {
            prop_assert!(decoded.next <= bytes.len());
            prop_assert!(decoded.next > decoded.offset);
        }
    }

    #[test]
    fn image_decoding_rejects_corruption(flip in 12usize..40, mask in 1u8..=255) {
        let mut bytes = conversation_module().encode();
        let index = flip.min(bytes.len() - 1);
        bytes[index] ^= mask;
        prop_assert!(ScriptModule::decode(&bytes).is_err());
    }
}
