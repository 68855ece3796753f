/*
 * Context Switch Primitive
 *
 * Saves the callee-saved register state of the running coroutine onto its
 * own stack, parks the resulting stack pointer in `save`, adopts the stack
 * pointer from `load`, restores the callee-saved state found there, and
 * returns into the loaded context.
 *
 * A freshly prepared stack (see `prepare_stack`) is laid out exactly as the
 * restore path expects, with the entry trampoline in the return-address
 * slot, so the first switch into a new coroutine "returns" into it.
 */

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        /// Bytes of saved register state below the return address:
        /// rbp, rbx, r12, r13, r14, r15.
        pub const FRAME_SIZE: usize = 6 * 8;

        /// Switch stacks: park the current stack pointer in `*save`, adopt
        /// `*load`, restore its frame and return into it.
        ///
        /// # Safety
        /// `save` and `load` must point at valid context slots; the stack
        /// behind `*load` must either be a parked frame produced by this
        /// function or one produced by `prepare_stack`.
        #[unsafe(naked)]
        pub unsafe extern "C" fn switch_context(save: *mut usize, load: *const usize) {
            core::arch::naked_asm!(
                "push rbp",
                "push rbx",
                "push r12",
                "push r13",
                "push r14",
                "push r15",
                "mov [rdi], rsp",
                "mov rsp, [rsi]",
                "pop r15",
                "pop r14",
                "pop r13",
                "pop r12",
                "pop rbx",
                "pop rbp",
                "ret",
            );
        }

        /// Lay out the initial frame for a new coroutine on `stack` and
        /// return the stack pointer to park in its context slot.
        ///
        /// Layout, from the top of the 16-byte aligned stack downward: one
        /// guard word (never returned to), the entry trampoline in the
        /// return-address slot, then six zeroed register slots. After the
        /// restore path pops the zeros and `ret`s, execution is at `entry`
        /// with the stack aligned as the ABI requires on function entry.
        pub fn prepare_stack(stack: &mut [u8], entry: extern "C" fn() -> !) -> usize {
            let top = (stack.as_mut_ptr() as usize + stack.len()) & !15;
            unsafe {
                ((top - 8) as *mut usize).write(0); // guard
                ((top - 16) as *mut usize).write(entry as usize);
                for slot in 1..=6 {
                    ((top - 16 - 8 * slot) as *mut usize).write(0);
                }
            }
            top - 16 - FRAME_SIZE
        }
    } else if #[cfg(target_arch = "aarch64")] {
        /// Bytes of saved register state: x19-x28, x29, x30, d8-d15.
        pub const FRAME_SIZE: usize = 20 * 8;

        /// Switch stacks: park the current stack pointer in `*save`, adopt
        /// `*load`, restore its frame and return into it.
        ///
        /// # Safety
        /// As for the x86_64 variant.
        #[unsafe(naked)]
        pub unsafe extern "C" fn switch_context(save: *mut usize, load: *const usize) {
            core::arch::naked_asm!(
                "sub sp, sp, #160",
                "stp x19, x20, [sp, #0]",
                "stp x21, x22, [sp, #16]",
                "stp x23, x24, [sp, #32]",
                "stp x25, x26, [sp, #48]",
                "stp x27, x28, [sp, #64]",
                "stp x29, x30, [sp, #80]",
                "stp d8, d9, [sp, #96]",
                "stp d10, d11, [sp, #112]",
                "stp d12, d13, [sp, #128]",
                "stp d14, d15, [sp, #144]",
                "mov x2, sp",
                "str x2, [x0]",
                "ldr x2, [x1]",
                "mov sp, x2",
                "ldp x19, x20, [sp, #0]",
                "ldp x21, x22, [sp, #16]",
                "ldp x23, x24, [sp, #32]",
                "ldp x25, x26, [sp, #48]",
                "ldp x27, x28, [sp, #64]",
                "ldp x29, x30, [sp, #80]",
                "ldp d8, d9, [sp, #96]",
                "ldp d10, d11, [sp, #112]",
                "ldp d12, d13, [sp, #128]",
                "ldp d14, d15, [sp, #144]",
                "add sp, sp, #160",
                "ret",
            );
        }

        /// Lay out the initial frame for a new coroutine on `stack` and
        /// return the stack pointer to park in its context slot.
        ///
        /// The saved-x30 slot holds the entry trampoline so the first
        /// restore returns into it; everything else starts zeroed.
        pub fn prepare_stack(stack: &mut [u8], entry: extern "C" fn() -> !) -> usize {
            let top = (stack.as_mut_ptr() as usize + stack.len()) & !15;
            let sp = top - FRAME_SIZE;
            unsafe {
                core::ptr::write_bytes(sp as *mut u8, 0, FRAME_SIZE);
                ((sp + 88) as *mut usize).write(entry as usize); // saved x30
            }
            sp
        }
    } else {
        compile_error!("no context switch implementation for this architecture");
    }
}
