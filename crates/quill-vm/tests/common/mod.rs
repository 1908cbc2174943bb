//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use quill_bytecode::{BytecodeWriter, ScriptModule, StringTable, VoiceTable};
use quill_vm::{
    ActorSystem, Collaborators, HostCallResult, Interface, InterfaceMode, InMemoryModuleRegistry,
    ModuleId, ObjectId, RandomSource, ReplyError, ScriptEngine, ThreadId, VmOptions,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Module every harness loads
pub const MODULE: ModuleId = ModuleId(1);

/// Host function recording its arguments
pub const PROBE: u16 = 0;

/// Host function recording the caller's stack depth
pub const DEPTH: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speech {
    pub actor: u16,
    pub lines: Vec<String>,
    pub sample: Option<i16>,
    pub flags: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub id: u8,
    pub flags: u8,
    pub once_bit: Option<u16>,
}

/// Everything the fake collaborators observed
#[derive(Debug, Default)]
pub struct Log {
    pub speaking: bool,
    pub speeches: Vec<Speech>,
    pub arrived: Vec<ObjectId>,
    pub replies: Vec<Reply>,
    pub reject_replies: bool,
    pub replies_cleared: usize,
    pub activations: usize,
    pub modes: Vec<InterfaceMode>,
    pub verb_resets: usize,
    pub probes: Vec<i16>,
    pub depths: Vec<usize>,
}

pub type SharedLog = Rc<RefCell<Log>>;

pub struct FakeActors(pub SharedLog);

impl ActorSystem for FakeActors {
    fn is_speaking(&self) -> bool {
        self.0.borrow().speaking
    }

    fn speak(&mut self, actor: u16, lines: &[&str], sample: Option<i16>, flags: u8) {
        self.0.borrow_mut().speeches.push(Speech {
            actor,
            lines: lines.iter().map(|line| line.to_string()).collect(),
            sample,
            flags,
        });
    }

    fn has_arrived(&self, object: ObjectId) -> bool {
        self.0.borrow().arrived.contains(&object)
    }
}

pub struct FakeInterface(pub SharedLog);

impl Interface for FakeInterface {
    fn clear_replies(&mut self) {
        let mut log = self.0.borrow_mut();
        log.replies.clear();
        log.replies_cleared += 1;
    }

    fn add_reply(
        &mut self,
        text: &str,
        reply_id: u8,
        flags: u8,
        once_bit: Option<u16>,
    ) -> Result<(), ReplyError> {
        let mut log = self.0.borrow_mut();
        if log.reject_replies {
            return Err(ReplyError("panel full".to_string()));
        }
        log.replies.push(Reply {
            text: text.to_string(),
            id: reply_id,
            flags,
            once_bit,
        });
        Ok(())
    }

    fn activate(&mut self) {
        self.0.borrow_mut().activations += 1;
    }

    fn set_mode(&mut self, mode: InterfaceMode) {
        self.0.borrow_mut().modes.push(mode);
    }

    fn reset_verb(&mut self) {
        self.0.borrow_mut().verb_resets += 1;
    }
}

/// Always rolls the same value (clamped to the range)
pub struct FixedRandom(pub u16);

impl RandomSource for FixedRandom {
    fn random_in_range(&mut self, max: u16) -> u16 {
        self.0.min(max)
    }
}

/// Build a module whose entry point 0 is at offset 0
pub fn module(strings: &[&str], build: impl FnOnce(&mut BytecodeWriter)) -> ScriptModule {
    let mut writer = BytecodeWriter::new();
    build(&mut writer);
    let strings: StringTable = strings.iter().copied().collect();
    ScriptModule::new("test", writer.into_bytes())
        .with_statics(0, 64)
        .with_entry_point("main", 0)
        .with_strings(strings)
        .with_voices(VoiceTable::from(vec![700, 701]))
}

/// Engine plus the log its fake collaborators write to
pub struct Harness {
    pub engine: ScriptEngine,
    pub log: SharedLog,
}

impl Harness {
    pub fn new(module: ScriptModule) -> Self {
        Self::with(module, VmOptions::default(), 0)
    }

    pub fn with(module: ScriptModule, options: VmOptions, roll: u16) -> Self {
        let log = SharedLog::default();
        let mut registry = InMemoryModuleRegistry::new();
        registry.insert_module(MODULE, module);

        let collaborators = Collaborators::detached()
            .with_actors(FakeActors(Rc::clone(&log)))
            .with_interface(FakeInterface(Rc::clone(&log)))
            .with_random(FixedRandom(roll));
        let mut engine =
            ScriptEngine::new(options, Box::new(registry), collaborators).expect("engine");

        let probes = Rc::clone(&log);
        engine.host_functions_mut().register(PROBE, move |call| {
            while let Ok(value) = call.arg() {
                probes.borrow_mut().probes.push(value);
            }
            HostCallResult::Void
        });
        let depths = Rc::clone(&log);
        engine.host_functions_mut().register(DEPTH, move |call| {
            let depth = call.thread().stack().pushed_size();
            depths.borrow_mut().depths.push(depth);
            HostCallResult::Void
        });

        Self { engine, log }
    }

    pub fn spawn(&mut self) -> ThreadId {
        self.engine.create_thread(MODULE, 0).expect("create thread")
    }

    pub fn probes(&self) -> Vec<i16> {
        self.log.borrow().probes.clone()
    }

    pub fn depths(&self) -> Vec<usize> {
        self.log.borrow().depths.clone()
    }
}
