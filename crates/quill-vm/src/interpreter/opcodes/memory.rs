//! Flag and word access across the five memory regions

use crate::interpreter::core::misrouted;
use crate::interpreter::execution::Flow;
use crate::interpreter::Interpreter;
use crate::thread::ScriptThread;
use crate::VmResult;
use quill_bytecode::{Address, FlagAddress, Instruction, Region};

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_memory_ops(
        &mut self,
        thread: &mut ScriptThread,
        instruction: &Instruction,
    ) -> VmResult<Flow> {
        match *instruction {
            Instruction::GetFlag(flag) => {
                let byte = self.read_byte(thread, flag.region, flag.byte_offset())?;
                let set = byte & flag.mask() != 0;
                thread.stack_mut().push(i16::from(set))?;
            }
            Instruction::PutFlag(flag) => {
                let value = thread.stack().peek()?;
                self.store_flag(thread, flag, value != 0)?;
            }
            Instruction::PutFlagV(flag) => {
                let value = thread.stack_mut().pop()?;
                self.store_flag(thread, flag, value != 0)?;
            }

            Instruction::GetInt(address) => {
                let value = self.read_word(thread, address)?;
                thread.stack_mut().push(value)?;
            }
            Instruction::PutInt(address) => {
                let value = thread.stack().peek()?;
                self.write_word(thread, address, value)?;
            }
            Instruction::PutIntV(address) => {
                let value = thread.stack_mut().pop()?;
                self.write_word(thread, address, value)?;
            }

            Instruction::IncV(address) => {
                let value = self.read_word(thread, address)?;
                self.write_word(thread, address, value.wrapping_add(1))?;
            }
            Instruction::DecV(address) => {
                let value = self.read_word(thread, address)?;
                self.write_word(thread, address, value.wrapping_sub(1))?;
            }
            Instruction::PostInc(address) => {
                let value = self.read_word(thread, address)?;
                thread.stack_mut().push(value)?;
                self.write_word(thread, address, value.wrapping_add(1))?;
            }
            Instruction::PostDec(address) => {
                let value = self.read_word(thread, address)?;
                thread.stack_mut().push(value)?;
                self.write_word(thread, address, value.wrapping_sub(1))?;
            }

            _ => return Err(misrouted(instruction, thread.pc())),
        }
        Ok(Flow::Next)
    }

    fn store_flag(&mut self, thread: &mut ScriptThread, flag: FlagAddress, set: bool) -> VmResult<()> {
        let offset = flag.byte_offset();
        let byte = self.read_byte(thread, flag.region, offset)?;
        let byte = if set {
            byte | flag.mask()
        } else {
            byte & !flag.mask()
        };
        self.write_byte(thread, flag.region, offset, byte)
    }

    // ===== Region Access =====

    fn read_byte(&self, thread: &ScriptThread, region: Region, offset: i32) -> VmResult<u8> {
        match region {
            Region::Stack => thread.stack().frame_byte(offset),
            Region::Thread => thread.var_byte(offset),
            _ => self.memory.read_byte(region, thread.module_id(), offset),
        }
    }

    fn write_byte(
        &mut self,
        thread: &mut ScriptThread,
        region: Region,
        offset: i32,
        value: u8,
    ) -> VmResult<()> {
        match region {
            Region::Stack => thread.stack_mut().set_frame_byte(offset, value),
            Region::Thread => thread.set_var_byte(offset, value),
            _ => self
                .memory
                .write_byte(region, thread.module_id(), offset, value),
        }
    }

    fn read_word(&self, thread: &ScriptThread, address: Address) -> VmResult<i16> {
        let offset = i32::from(address.offset);
        match address.region {
            Region::Stack | Region::Thread => {
                let low = self.read_byte(thread, address.region, offset)?;
                let high = self.read_byte(thread, address.region, offset + 1)?;
                Ok(i16::from_le_bytes([low, high]))
            }
            region => self.memory.read_word(region, thread.module_id(), offset),
        }
    }

    fn write_word(&mut self, thread: &mut ScriptThread, address: Address, value: i16) -> VmResult<()> {
        let offset = i32::from(address.offset);
        match address.region {
            Region::Stack | Region::Thread => {
                // Check both bytes before touching either
                self.read_byte(thread, address.region, offset + 1)?;
                let [low, high] = value.to_le_bytes();
                self.write_byte(thread, address.region, offset, low)?;
                self.write_byte(thread, address.region, offset + 1, high)
            }
            region => self
                .memory
                .write_word(region, thread.module_id(), offset, value),
        }
    }
}
