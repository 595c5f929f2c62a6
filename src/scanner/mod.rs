//! Static scan of compiled VM programs for referenced hardware features.
//!
//! The scan is conservative: a feature is flagged when the program text
//! references it, whether or not that code path ever runs. This avoids hooking
//! the interpreter itself.

pub mod opcode;
pub mod vm_layout;

use log::debug;

use crate::usage::FeatureFlags;
use opcode::{OpcodeClass, operand, signed_operand};
use vm_layout::{event_feature, read_feature, write_feature};

/// Scan a program buffer and return the features it references.
///
/// Layout: word 0 holds the event table length in words (itself included),
/// followed by `(event id, handler address)` pairs, followed by code. The code
/// walk stops at a `Stop` that lies beyond every handler, jump and call target
/// seen so far, since earlier `Stop`s only end one handler.
///
/// A table length larger than the buffer is treated as a corrupt program and
/// yields no flags.
pub fn scan_program(program: &[u16]) -> FeatureFlags {
    let mut flags = FeatureFlags::empty();

    let Some(&table_len) = program.first() else {
        return flags;
    };
    let table_len = usize::from(table_len);
    if table_len > program.len() {
        debug!(
            "Event table length {} exceeds program length {}, skipping scan",
            table_len,
            program.len()
        );
        return flags;
    }

    // Furthest address control flow is known to reach
    let mut high_water = 0usize;

    let mut cursor = 1;
    while cursor + 1 < table_len {
        if let Some(flag) = event_feature(program[cursor]) {
            flags.insert(flag);
        }
        high_water = high_water.max(usize::from(program[cursor + 1]));
        cursor += 2;
    }

    let mut pc = table_len.max(1);
    while pc < program.len() {
        let word = program[pc];
        let class = OpcodeClass::decode(word);

        let feature = match class {
            OpcodeClass::Stop => {
                if pc > high_water {
                    break;
                }
                None
            }
            OpcodeClass::Load | OpcodeClass::LoadIndirect => read_feature(operand(word)),
            OpcodeClass::Store | OpcodeClass::StoreIndirect => write_feature(operand(word)),
            OpcodeClass::Emit => program.get(pc + 1).and_then(|&address| read_feature(address)),
            OpcodeClass::Jump => {
                let target = pc as i64 + i64::from(signed_operand(word));
                if target > high_water as i64 {
                    high_water = target as usize;
                }
                None
            }
            OpcodeClass::SubCall => {
                high_water = high_water.max(usize::from(operand(word)));
                None
            }
            _ => None,
        };

        if let Some(flag) = feature {
            flags.insert(flag);
        }

        pc += class.width();
    }

    flags
}
