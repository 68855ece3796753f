/*
 * Cooperative Scheduler
 *
 * Multiplexes up to MAX_THREADS logical threads plus the reserved original
 * thread onto the one OS thread the checker runs on. Each logical thread
 * gets a fixed-size private stack; switching threads is a callee-saved
 * register swap, so exactly one logical thread executes at any instant and
 * control moves only at explicit `switch_to` calls.
 *
 * A thread's task is installed with `add_thread` and runs when the thread
 * is first switched to. Tasks must never return; the interceptor wraps
 * every task so that it ends in a final switch away instead.
 */

mod switch;

use core::cell::{Cell, RefCell, UnsafeCell};

use crate::config::{MAX_THREADS, STACK_SIZE};
use crate::types::ThreadId;

type Task = Box<dyn FnOnce()>;

pub struct Scheduler {
    stacks: RefCell<Vec<Box<[u8]>>>,
    /// Parked stack pointer per thread slot, plus one for the original
    /// thread. Raw storage: entries are only touched around a switch, never
    /// across one.
    contexts: UnsafeCell<[usize; MAX_THREADS + 1]>,
    tasks: RefCell<[Option<Task>; MAX_THREADS]>,
    current: Cell<ThreadId>,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler {
            stacks: RefCell::new(
                (0..MAX_THREADS)
                    .map(|_| vec![0u8; STACK_SIZE].into_boxed_slice())
                    .collect(),
            ),
            contexts: UnsafeCell::new([0; MAX_THREADS + 1]),
            tasks: RefCell::new(core::array::from_fn(|_| None)),
            current: Cell::new(ThreadId::ORIGINAL),
        }
    }

    /// Thread currently executing on the OS thread.
    #[inline]
    pub fn current_thread(&self) -> ThreadId {
        self.current.get()
    }

    /// Install `task` as thread `thread`'s body and prepare its stack so the
    /// first switch to it enters the task.
    pub fn add_thread(&self, thread: ThreadId, task: Task) {
        let sp = switch::prepare_stack(&mut self.stacks.borrow_mut()[thread.index()], coroutine_entry);
        unsafe {
            (*self.contexts.get())[thread.slot()] = sp;
        }
        self.tasks.borrow_mut()[thread.index()] = Some(task);
    }

    /// Cooperatively switch to `thread`. The caller is suspended until some
    /// other thread switches back to it. Switching to the running thread is
    /// a no-op.
    pub fn switch_to(&self, thread: ThreadId) {
        if thread == self.current.get() {
            return;
        }
        let old = self.current.replace(thread);
        unsafe {
            let contexts = self.contexts.get() as *mut usize;
            switch::switch_context(contexts.add(old.slot()), contexts.add(thread.slot()));
        }
    }

    /// Remove and return the pending task of the running thread.
    ///
    /// Called exactly once per `add_thread`, from the entry trampoline.
    fn take_current_task(&self) -> Task {
        let thread = self.current.get();
        self.tasks.borrow_mut()[thread.index()]
            .take()
            .expect("coroutine resumed without a task")
    }
}

/// First instruction of every coroutine: run the installed task. The task is
/// wrapped by the interceptor to end in a switch away, so falling off the
/// end is a checker bug.
extern "C" fn coroutine_entry() -> ! {
    crate::runtime::with(|rt| {
        let task = rt.scheduler().take_current_task();
        task();
    });
    panic!("coroutine task returned");
}
