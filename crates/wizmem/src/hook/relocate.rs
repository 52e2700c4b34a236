//! Instruction relocation for the generic hook backend.
//!
//! The jump written at a hook site is a fixed 14-byte sequence:
//!
//! ```text
//! push rax                ; 1 byte
//! mov  rax, cave          ; 10 bytes
//! jmp  rax                ; 2 bytes
//! pop  rax                ; 1 byte   <- jump-back target
//! ```
//!
//! The instructions it displaces are decoded, never split, re-encoded at the
//! cave address (fixing RIP-relative operands), and followed by a jump back
//! to the site's `pop rax`. Site bytes consumed beyond the 14 are padded
//! with NOPs so execution resumes on a real instruction boundary.

use iced_x86::{
    BlockEncoder, BlockEncoderOptions, Code, Decoder, DecoderOptions, Instruction,
    InstructionBlock, Register,
};

use crate::error::{Error, Result};

/// Bytes needed at the site for the indirect jump sequence.
pub const JUMP_SIZE: usize = 14;

/// How far past the minimum the decoder may look for a boundary.
const DECODE_WINDOW: usize = JUMP_SIZE + 10;

const NOP: u8 = 0x90;

/// The displaced site prologue.
#[derive(Debug, Clone)]
pub struct Prologue {
    pub instructions: Vec<Instruction>,
    /// Total bytes consumed at the site; at least [`JUMP_SIZE`].
    pub consumed: usize,
}

fn encoding_error(e: iced_x86::IcedError) -> Error {
    Error::Relocation(e.to_string())
}

/// Decode whole instructions at `site_address` until the jump sequence fits.
///
/// `site_bytes` must hold at least [`JUMP_SIZE`] + the longest instruction
/// that could straddle the boundary ([`decode_window`] bytes is enough).
pub fn decode_prologue(site_bytes: &[u8], site_address: u64) -> Result<Prologue> {
    let mut decoder = Decoder::with_ip(64, site_bytes, site_address, DecoderOptions::NONE);

    let mut instructions = Vec::new();
    let mut consumed = 0usize;

    while decoder.can_decode() {
        let instruction = decoder.decode();
        if instruction.is_invalid() {
            return Err(Error::Relocation(format!(
                "undecodable instruction at {:#x}",
                site_address + consumed as u64
            )));
        }

        consumed += instruction.len();
        instructions.push(instruction);

        if consumed >= JUMP_SIZE {
            return Ok(Prologue {
                instructions,
                consumed,
            });
        }
    }

    Err(Error::Relocation(format!(
        "ran out of bytes finding an instruction boundary at {:#x}",
        site_address
    )))
}

/// How many bytes [`decode_prologue`] wants to look at.
pub fn decode_window() -> usize {
    DECODE_WINDOW
}

/// The bytes written over the jump site: the 14-byte indirect jump plus NOP
/// padding out to the consumed length.
pub fn build_site_patch(site_address: u64, cave_address: u64, consumed: usize) -> Result<Vec<u8>> {
    let jump = [
        Instruction::with1(Code::Push_r64, Register::RAX).map_err(encoding_error)?,
        Instruction::with2(Code::Mov_r64_imm64, Register::RAX, cave_address)
            .map_err(encoding_error)?,
        Instruction::with1(Code::Jmp_rm64, Register::RAX).map_err(encoding_error)?,
        Instruction::with1(Code::Pop_r64, Register::RAX).map_err(encoding_error)?,
    ];
    let block = InstructionBlock::new(&jump, site_address);
    let encoded = BlockEncoder::encode(64, block, BlockEncoderOptions::NONE)
        .map_err(encoding_error)?
        .code_buffer;

    if encoded.len() != JUMP_SIZE {
        return Err(Error::Relocation(format!(
            "jump sequence encoded to {} bytes, expected {JUMP_SIZE}",
            encoded.len()
        )));
    }

    let mut patch = encoded;
    patch.resize(consumed, NOP);
    Ok(patch)
}

/// Build the cave: payload, relocated prologue, then the jump back to the
/// site's `pop rax`.
pub fn build_cave(
    payload: &[u8],
    prologue: &Prologue,
    cave_address: u64,
    site_address: u64,
) -> Result<Vec<u8>> {
    let mut cave = payload.to_vec();

    // The jump-back lands on the pop rax at site + 13 so the rax pushed on
    // entry is restored before the first untouched instruction runs.
    let return_address = site_address + JUMP_SIZE as u64 - 1;

    let mut tail = prologue.instructions.clone();
    tail.push(
        Instruction::with2(Code::Mov_r64_imm64, Register::RAX, return_address)
            .map_err(encoding_error)?,
    );
    tail.push(Instruction::with1(Code::Jmp_rm64, Register::RAX).map_err(encoding_error)?);

    let block = InstructionBlock::new(&tail, cave_address + payload.len() as u64);
    let encoded = BlockEncoder::encode(64, block, BlockEncoderOptions::NONE)
        .map_err(encoding_error)?
        .code_buffer;

    cave.extend_from_slice(&encoded);
    Ok(cave)
}

#[cfg(test)]
mod tests {
    use super::*;

    // mov [rsp+58h], rbx / mov [rsp+60h], rbp / mov [rsp+68h], rsi — three
    // 5-byte stores, the shape the duel hook patches.
    const SITE: [u8; 24] = [
        0x48, 0x89, 0x5C, 0x24, 0x58, //
        0x48, 0x89, 0x6C, 0x24, 0x60, //
        0x48, 0x89, 0x74, 0x24, 0x68, //
        0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90,
    ];

    #[test]
    fn prologue_never_splits_an_instruction() {
        let prologue = decode_prologue(&SITE, 0x1400_0000).unwrap();
        // 14 bytes needed, instructions are 5 bytes each: 3 consumed, 15 total.
        assert_eq!(prologue.instructions.len(), 3);
        assert_eq!(prologue.consumed, 15);
    }

    #[test]
    fn prologue_exact_fit_takes_no_extra() {
        // 14 one-byte NOPs: exactly JUMP_SIZE instructions consumed.
        let site = [NOP; 24];
        let prologue = decode_prologue(&site, 0x1400_0000).unwrap();
        assert_eq!(prologue.consumed, JUMP_SIZE);
        assert_eq!(prologue.instructions.len(), JUMP_SIZE);
    }

    #[test]
    fn site_patch_is_padded_to_consumed_length() {
        let patch = build_site_patch(0x1400_0000, 0x2000_0000, 15).unwrap();
        assert_eq!(patch.len(), 15);
        // push rax first, NOP padding after the pop rax.
        assert_eq!(patch[0], 0x50);
        assert_eq!(patch[JUMP_SIZE - 1], 0x58);
        assert_eq!(patch[JUMP_SIZE], NOP);
    }

    #[test]
    fn cave_starts_with_payload_and_relocates_prologue() {
        let prologue = decode_prologue(&SITE, 0x1400_0000).unwrap();
        let payload = [0xCC, 0xCC, 0xCC];
        let cave = build_cave(&payload, &prologue, 0x2000_0000, 0x1400_0000).unwrap();

        assert_eq!(&cave[..3], &payload);
        // The three stores are position-independent, so they re-encode
        // byte-identically after the payload.
        assert_eq!(&cave[3..18], &SITE[..15]);

        // Decode the tail and check the jump-back target lands on the pop.
        let tail = &cave[18..];
        let mut decoder = Decoder::with_ip(64, tail, 0, DecoderOptions::NONE);
        let mov = decoder.decode();
        assert_eq!(mov.code(), Code::Mov_r64_imm64);
        assert_eq!(mov.immediate64(), 0x1400_0000 + JUMP_SIZE as u64 - 1);
        let jmp = decoder.decode();
        assert_eq!(jmp.code(), Code::Jmp_rm64);
    }

    #[test]
    fn rip_relative_prologue_is_fixed_up() {
        // lea rax, [rip+0x100] at 0x1400_0000, then NOPs.
        let mut site = [NOP; 24];
        site[..7].copy_from_slice(&[0x48, 0x8D, 0x05, 0x00, 0x01, 0x00, 0x00]);

        let prologue = decode_prologue(&site, 0x1400_0000).unwrap();
        let cave = build_cave(&[], &prologue, 0x2000_0000, 0x1400_0000).unwrap();

        // Re-decode at the cave address: the lea must still reference
        // 0x1400_0107 even though it moved.
        let mut decoder = Decoder::with_ip(64, &cave, 0x2000_0000, DecoderOptions::NONE);
        let lea = decoder.decode();
        assert_eq!(lea.code(), Code::Lea_r64_m);
        assert_eq!(lea.memory_displacement64(), 0x1400_0107);
    }

    #[test]
    fn garbage_bytes_fail_decoding() {
        // 0x06 (push es) does not decode in 64-bit mode.
        let site = [0x06u8; 24];
        assert!(matches!(
            decode_prologue(&site, 0x1000),
            Err(Error::Relocation(_))
        ));
    }
}
