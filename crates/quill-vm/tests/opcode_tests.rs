//! Opcode semantics, driven through the engine
//!
//! Each test assembles a small routine, runs it to completion and inspects
//! what it reported through the probe host functions or left in memory.

mod common;

use common::{module, Harness, DEPTH, MODULE, PROBE};
use quill_bytecode::{BinaryOp, BytecodeWriter, Region, CODE_PAGE_SIZE};
use quill_vm::thread::vars;
use quill_vm::{HostCallResult, VmError, VmOptions};

// =============================================================================
// HELPERS
// =============================================================================

fn run(build: impl FnOnce(&mut BytecodeWriter)) -> Harness {
    let mut harness = Harness::new(module(&[], build));
    harness.spawn();
    harness.engine.drain_to_completion().expect("drain");
    harness
}

/// Wrap `body` in a frame, probe the value it leaves and return
fn probe_result(body: impl FnOnce(&mut BytecodeWriter)) -> Vec<i16> {
    run(|w| {
        w.emit_enter(0);
        body(w);
        w.emit_ccall_v(1, PROBE);
        w.emit_return_v();
    })
    .probes()
}

/// Run a routine expected to fail and return the error
fn run_failing(options: VmOptions, build: impl FnOnce(&mut BytecodeWriter)) -> VmError {
    let mut harness = Harness::with(module(&[], build), options, 0);
    harness.spawn();
    harness
        .engine
        .drain_to_completion()
        .expect_err("routine should fail")
}

// =============================================================================
// STACK AND ARITHMETIC
// =============================================================================

#[test]
fn test_sub_is_second_popped_minus_first() {
    let probes = probe_result(|w| {
        w.emit_const_int(5);
        w.emit_const_int(3);
        w.emit_sub();
    });
    assert_eq!(probes, vec![2]);
}

#[test]
fn test_binary_operators() {
    let cases = [
        (BinaryOp::Add, 7, 5, 12),
        (BinaryOp::Sub, 7, 5, 2),
        (BinaryOp::Mul, -3, 4, -12),
        (BinaryOp::Div, -7, 2, -3),
        (BinaryOp::Mod, -7, 2, -1),
        (BinaryOp::Eq, 3, 3, 1),
        (BinaryOp::Ne, 3, 3, 0),
        (BinaryOp::Gt, -1, 0, 0),
        (BinaryOp::Lt, -1, 0, 1),
        (BinaryOp::Ge, 2, 2, 1),
        (BinaryOp::Le, 3, 2, 0),
        (BinaryOp::Rsh, 64, 3, 8),
        (BinaryOp::Lsh, 3, 2, 12),
        (BinaryOp::And, 6, 3, 2),
        (BinaryOp::Or, 6, 3, 7),
        (BinaryOp::Xor, 6, 3, 5),
        (BinaryOp::LAnd, 2, 0, 0),
        (BinaryOp::LOr, 0, 9, 1),
        (BinaryOp::LXor, 4, 9, 0),
    ];

    for (op, left, right, expected) in cases {
        let probes = probe_result(|w| {
            w.emit_const_int(left);
            w.emit_const_int(right);
            w.emit_binary(op);
        });
        assert_eq!(probes, vec![expected], "{:?} {} {}", op, left, right);
    }
}

#[test]
fn test_addition_wraps() {
    let probes = probe_result(|w| {
        w.emit_const_int(i16::MAX);
        w.emit_one();
        w.emit_add();
    });
    assert_eq!(probes, vec![i16::MIN]);
}

#[test]
fn test_unary_operators() {
    assert_eq!(
        probe_result(|w| {
            w.emit_const_int(5);
            w.emit_negate();
        }),
        vec![-5]
    );
    assert_eq!(
        probe_result(|w| {
            w.emit_zero();
            w.emit_not();
        }),
        vec![1]
    );
    assert_eq!(
        probe_result(|w| {
            w.emit_const_int(7);
            w.emit_not();
        }),
        vec![0]
    );
    assert_eq!(
        probe_result(|w| {
            w.emit_zero();
            w.emit_compl();
        }),
        vec![-1]
    );
}

#[test]
fn test_stack_operators() {
    assert_eq!(
        probe_result(|w| {
            w.emit_const_int(4);
            w.emit_dup();
            w.emit_add();
        }),
        vec![8]
    );
    assert_eq!(
        probe_result(|w| {
            w.emit_one();
            w.emit_const_int(2);
            w.emit_drop();
        }),
        vec![1]
    );
    assert_eq!(probe_result(|w| w.emit_str_lit(3)), vec![3]);
}

#[test]
fn test_division_by_zero_is_fatal() {
    let mut harness = Harness::new(module(&[], |w| {
        w.emit_enter(0);
        w.emit_one();
        w.emit_zero();
        w.emit_div();
        w.emit_return_v();
    }));
    let id = harness.spawn();

    let error = harness.engine.tick(0).expect_err("division by zero");
    assert!(matches!(error.root(), VmError::DivisionByZero));
    match error {
        VmError::InThread {
            thread,
            offset,
            opcode,
            ..
        } => {
            assert_eq!(thread, id);
            assert_eq!(offset, 5);
            assert_eq!(opcode, BinaryOp::Div.opcode().to_u8());
        }
        other => panic!("expected thread context, got {other:?}"),
    }

    // The failing thread is aborted and reaped on the next tick
    harness.engine.tick(0).unwrap();
    assert_eq!(harness.engine.live_thread_count(), 0);
}

// =============================================================================
// CONTROL FLOW
// =============================================================================

fn switch_on(selector: i16) -> Vec<i16> {
    probe_result(|w| {
        w.emit_const_int(selector);
        // opcode + count + two cases + default
        let one = w.label() + 13;
        let two = one + 6;
        let default = two + 6;
        let end = default + 3;
        w.emit_jmp_switch(&[(1, one), (2, two)], default);
        w.emit_const_int(10);
        w.emit_jmp(end);
        w.emit_const_int(20);
        w.emit_jmp(end);
        w.emit_const_int(99);
        assert_eq!(w.label(), end);
    })
}

#[test]
fn test_switch() {
    assert_eq!(switch_on(1), vec![10]);
    assert_eq!(switch_on(2), vec![20]);
    assert_eq!(switch_on(9), vec![99]);
    assert_eq!(switch_on(-1), vec![99]);
}

fn random_with_roll(roll: u16) -> Vec<i16> {
    let module = module(&[], |w| {
        w.emit_enter(0);
        // opcode + count + total + two branches
        let rare = w.label() + 13;
        let common = rare + 6;
        let end = common + 3;
        w.emit_jmp_random(&[(1, rare), (3, common)]);
        w.emit_const_int(1);
        w.emit_jmp(end);
        w.emit_const_int(2);
        w.emit_ccall_v(1, PROBE);
        w.emit_return_v();
    });
    let mut harness = Harness::with(module, VmOptions::default(), roll);
    harness.spawn();
    harness.engine.drain_to_completion().unwrap();
    harness.probes()
}

#[test]
fn test_random_branch_weights() {
    assert_eq!(random_with_roll(0), vec![1]);
    assert_eq!(random_with_roll(1), vec![2]);
    assert_eq!(random_with_roll(3), vec![2]);
    // Rolls are drawn from 0..=total-1
    assert_eq!(random_with_roll(40), vec![2]);
}

#[test]
fn test_pop_and_peek_branches() {
    // JMP_FALSE_V pops its operand
    let harness = run(|w| {
        w.emit_enter(0);
        w.emit_zero();
        let to_taken = w.emit_jmp_false_v(0);
        w.emit_const_int(10);
        let to_end = w.emit_jmp(0);
        let taken = w.label();
        w.patch_u16(to_taken, taken);
        w.emit_const_int(20);
        let end = w.label();
        w.patch_u16(to_end, end);
        w.emit_ccall_v(0, DEPTH);
        w.emit_ccall_v(1, PROBE);
        w.emit_return_v();
    });
    assert_eq!(harness.probes(), vec![20]);
    assert_eq!(harness.depths(), vec![2]);

    // JMP_TRUE peeks, leaving the operand for the target
    let harness = run(|w| {
        w.emit_enter(0);
        w.emit_const_int(4);
        let to_taken = w.emit_jmp_true(0);
        w.emit_const_int(10);
        let taken = w.label();
        w.patch_u16(to_taken, taken);
        w.emit_const_int(5);
        w.emit_add();
        w.emit_ccall_v(0, DEPTH);
        w.emit_ccall_v(1, PROBE);
        w.emit_return_v();
    });
    assert_eq!(harness.probes(), vec![9]);
    assert_eq!(harness.depths(), vec![2]);
}

#[test]
fn test_next_block_jumps_to_next_page() {
    let probes = probe_result(|w| {
        w.emit_next_block();
        w.pad_to(CODE_PAGE_SIZE);
        w.emit_const_int(5);
    });
    assert_eq!(probes, vec![5]);
}

#[test]
fn test_animate_skips_block() {
    let probes = probe_result(|w| {
        // ANIMATE is 6 bytes; skip it and the constant after it
        w.emit_animate(9);
        w.emit_const_int(99);
        w.emit_const_int(5);
    });
    assert_eq!(probes, vec![5]);
}

#[test]
fn test_jump_out_of_range_is_fatal() {
    let error = run_failing(VmOptions::default().with_verification(false), |w| {
        w.emit_enter(0);
        w.emit_jmp(0x4000);
    });
    assert!(matches!(
        error.root(),
        VmError::ExecutionOutOfRange { target: 0x4000, .. }
    ));
}

#[test]
fn test_unknown_opcode_is_fatal() {
    let error = run_failing(VmOptions::default().with_verification(false), |w| {
        w.emit_enter(0);
        w.emit_u8(0xEE);
    });
    assert!(matches!(
        error.root(),
        VmError::InvalidOpcode {
            opcode: 0xEE,
            offset: 3
        }
    ));
}

// =============================================================================
// CALLS
// =============================================================================

#[test]
fn test_call_and_return() {
    let harness = run(|w| {
        w.emit_enter(0);
        // The return path drops two words per counted argument
        w.emit_one();
        w.emit_const_int(7);
        let to_sub = w.emit_call(1, 0);
        w.emit_ccall_v(0, DEPTH);
        w.emit_ccall_v(1, PROBE);
        w.emit_return_v();

        let sub = w.label();
        w.patch_u16(to_sub, sub);
        w.emit_enter(2);
        // Last argument pushed sits just above the argument count
        w.emit_get_int(Region::Stack, 6);
        w.emit_one();
        w.emit_add();
        w.emit_return();
    });
    assert_eq!(harness.probes(), vec![8]);
    // Saved frame plus the return value
    assert_eq!(harness.depths(), vec![2]);
}

#[test]
fn test_outermost_return_finishes_thread() {
    let mut harness = Harness::new(module(&[], |w| {
        w.emit_enter(0);
        w.emit_const_int(3);
        w.emit_return();
    }));
    let id = harness.spawn();

    harness.engine.tick(0).unwrap();
    let thread = harness.engine.thread(id).expect("not reaped yet");
    assert!(thread.is_done());
    assert_eq!(thread.return_value(), 3);

    harness.engine.tick(0).unwrap();
    assert!(harness.engine.thread(id).is_none());
    assert_eq!(harness.log.borrow().verb_resets, 1);
    assert_eq!(harness.engine.stats().threads_finished, 1);
}

#[test]
fn test_host_call_value_is_pushed() {
    let mut harness = Harness::new(module(&[], |w| {
        w.emit_enter(0);
        w.emit_const_int(4);
        w.emit_const_int(2);
        w.emit_ccall(2, 7);
        w.emit_ccall_v(1, PROBE);
        w.emit_return_v();
    }));
    harness.engine.host_functions_mut().register(7, |call| {
        let b = call.arg().unwrap_or(0);
        let a = call.arg().unwrap_or(0);
        HostCallResult::Value(a * 10 + b)
    });
    harness.spawn();
    harness.engine.drain_to_completion().unwrap();
    assert_eq!(harness.probes(), vec![42]);
}

#[test]
fn test_host_call_unconsumed_args_are_discarded() {
    let mut harness = Harness::new(module(&[], |w| {
        w.emit_enter(0);
        w.emit_one();
        w.emit_one();
        w.emit_ccall_v(2, 8);
        w.emit_ccall_v(0, DEPTH);
        w.emit_return_v();
    }));
    harness
        .engine
        .host_functions_mut()
        .register(8, |_| HostCallResult::Void);
    harness.spawn();
    harness.engine.drain_to_completion().unwrap();
    assert_eq!(harness.depths(), vec![1]);
}

#[test]
fn test_host_call_error_continues() {
    let mut harness = Harness::new(module(&[], |w| {
        w.emit_enter(0);
        w.emit_ccall_v(0, 9);
        w.emit_const_int(1);
        w.emit_ccall_v(1, PROBE);
        w.emit_return_v();
    }));
    harness
        .engine
        .host_functions_mut()
        .register(9, |_| HostCallResult::Error("no such actor".to_string()));
    harness.spawn();
    harness.engine.drain_to_completion().unwrap();
    assert_eq!(harness.probes(), vec![1]);
}

#[test]
fn test_host_call_end_slice() {
    let mut harness = Harness::new(module(&[], |w| {
        w.emit_enter(0);
        w.emit_ccall(0, 10);
        w.emit_ccall_v(0, DEPTH);
        w.emit_const_int(1);
        w.emit_ccall_v(1, PROBE);
        w.emit_return_v();
    }));
    harness
        .engine
        .host_functions_mut()
        .register(10, |_| HostCallResult::EndSlice);
    harness.spawn();

    harness.engine.tick(0).unwrap();
    assert!(harness.probes().is_empty());
    assert!(harness.depths().is_empty());
    harness.engine.tick(0).unwrap();
    // CCALL pushes nothing when the call ends the slice
    assert_eq!(harness.depths(), vec![1]);
    assert_eq!(harness.probes(), vec![1]);
}

#[test]
fn test_host_call_restores_depth_after_direct_pushes() {
    let mut harness = Harness::new(module(&[], |w| {
        w.emit_enter(0);
        w.emit_one();
        w.emit_ccall_v(1, 11);
        w.emit_ccall_v(0, DEPTH);
        w.emit_return_v();
    }));
    harness.engine.host_functions_mut().register(11, |call| {
        let stack = call.thread_mut().stack_mut();
        let _ = stack.push(7);
        let _ = stack.push(8);
        HostCallResult::Void
    });
    harness.spawn();
    harness.engine.drain_to_completion().unwrap();
    assert_eq!(harness.depths(), vec![1]);
}

#[test]
fn test_host_call_popping_past_its_args_is_fatal() {
    let mut harness = Harness::new(module(&[], |w| {
        w.emit_enter(0);
        w.emit_one();
        w.emit_ccall_v(1, 12);
        w.emit_return_v();
    }));
    harness.engine.host_functions_mut().register(12, |call| {
        let stack = call.thread_mut().stack_mut();
        let _ = stack.pop();
        let _ = stack.pop();
        HostCallResult::Void
    });
    harness.spawn();
    let error = harness.engine.tick(0).unwrap_err();
    assert!(matches!(error.root(), VmError::StackUnderflow));
}

#[test]
fn test_unknown_host_function() {
    let error = run_failing(VmOptions::default(), |w| {
        w.emit_enter(0);
        w.emit_ccall_v(0, 200);
        w.emit_return_v();
    });
    assert!(matches!(error.root(), VmError::UnknownHostFunction(200)));
}

#[test]
fn test_stack_overflow() {
    let error = run_failing(VmOptions::default().with_stack_words(4), |w| {
        w.emit_enter(0);
        let top = w.label();
        w.emit_one();
        w.emit_jmp(top);
    });
    assert!(matches!(error.root(), VmError::StackOverflow { capacity: 4 }));
}

// =============================================================================
// MEMORY
// =============================================================================

#[test]
fn test_put_int_peeks_and_put_int_v_pops() {
    let harness = run(|w| {
        w.emit_enter(0);
        w.emit_const_int(9);
        w.emit_put_int(Region::Common, 10);
        w.emit_ccall_v(0, DEPTH);
        w.emit_put_int_v(Region::Common, 12);
        w.emit_ccall_v(0, DEPTH);
        w.emit_return_v();
    });
    assert_eq!(harness.depths(), vec![2, 1]);
    let memory = harness.engine.memory();
    assert_eq!(memory.read_word(Region::Common, MODULE, 10).unwrap(), 9);
    assert_eq!(memory.read_word(Region::Common, MODULE, 12).unwrap(), 9);
}

#[test]
fn test_increments() {
    let harness = run(|w| {
        w.emit_enter(0);
        w.emit_const_int(5);
        w.emit_put_int_v(Region::Static, 4);
        w.emit_inc_v(Region::Static, 4);
        w.emit_post_inc(Region::Static, 4);
        w.emit_ccall_v(1, PROBE);
        w.emit_post_dec(Region::Static, 4);
        w.emit_ccall_v(1, PROBE);
        w.emit_dec_v(Region::Static, 4);
        w.emit_get_int(Region::Static, 4);
        w.emit_ccall_v(1, PROBE);
        w.emit_return_v();
    });
    assert_eq!(harness.probes(), vec![6, 7, 5]);
}

#[test]
fn test_flags() {
    let harness = run(|w| {
        w.emit_enter(0);
        w.emit_one();
        w.emit_put_flag_v(Region::Static, 13);
        w.emit_get_flag(Region::Static, 13);
        w.emit_get_flag(Region::Static, 12);
        w.emit_ccall_v(2, PROBE);
        w.emit_return_v();
    });
    // Arguments arrive last pushed first
    assert_eq!(harness.probes(), vec![0, 1]);
    let byte = harness.engine.memory().read_byte(Region::Common, MODULE, 1).unwrap();
    assert_eq!(byte, 0x20);
}

#[test]
fn test_put_flag_clears_and_keeps_value() {
    let harness = run(|w| {
        w.emit_enter(0);
        w.emit_one();
        w.emit_put_flag_v(Region::Common, 3);
        w.emit_zero();
        w.emit_put_flag(Region::Common, 3);
        w.emit_get_flag(Region::Common, 3);
        w.emit_ccall_v(2, PROBE);
        w.emit_return_v();
    });
    assert_eq!(harness.probes(), vec![0, 0]);
}

#[test]
fn test_stack_region_locals() {
    let probes = probe_result(|w| {
        w.emit_enter(4);
        w.emit_const_int(9);
        w.emit_put_int_v(Region::Stack, -2);
        w.emit_const_int(4);
        w.emit_put_int_v(Region::Stack, -4);
        w.emit_get_int(Region::Stack, -2);
        w.emit_get_int(Region::Stack, -4);
        w.emit_sub();
    });
    assert_eq!(probes, vec![5]);
}

#[test]
fn test_thread_region_reads_seeded_vars() {
    let mut harness = Harness::new(module(&[], |w| {
        w.emit_enter(0);
        w.emit_get_int(Region::Thread, 4);
        w.emit_ccall_v(1, PROBE);
        w.emit_return_v();
    }));
    let id = harness.spawn();
    harness
        .engine
        .thread_mut(id)
        .unwrap()
        .set_var(vars::ACTION, 321)
        .unwrap();
    harness.engine.drain_to_completion().unwrap();
    assert_eq!(harness.probes(), vec![321]);
}

#[test]
fn test_module_region_reads_code() {
    // ENTER 0 encodes as 1A 00 00
    let probes = probe_result(|w| w.emit_get_int(Region::Module, 0));
    assert_eq!(probes, vec![0x1A]);
}

#[test]
fn test_address_out_of_range() {
    let error = run_failing(VmOptions::default(), |w| {
        w.emit_enter(0);
        w.emit_get_int(Region::Common, 16383);
        w.emit_return_v();
    });
    assert!(matches!(
        error.root(),
        VmError::AddressOutOfRange {
            region: Region::Common,
            offset: 16383,
            len: 16384
        }
    ));
}

#[test]
fn test_thread_region_out_of_range() {
    let error = run_failing(VmOptions::default(), |w| {
        w.emit_enter(0);
        w.emit_get_int(Region::Thread, 7);
        w.emit_return_v();
    });
    assert!(matches!(
        error.root(),
        VmError::AddressOutOfRange {
            region: Region::Thread,
            ..
        }
    ));
}
