use std::cell::Cell;

use super::classes::ClassRegistry;
use super::error::{InterpreterFault, VmError};
use super::instruction::Instruction;
use super::loader::StubLoader;
use super::reflect::ReflectCache;

/// Nested interpreter runs allowed on one thread before
/// `java.lang.StackOverflowError` is thrown.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Native stack the nested runs of one thread may use, measured from the
/// outermost run. Kept under the 2 MiB of a default spawned thread.
pub const NATIVE_STACK_BUDGET: usize = 1024 * 1024;

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
    static STACK_BASE: Cell<usize> = const { Cell::new(0) };
}

/// Approximate address of the current native stack top.
#[inline(never)]
fn stack_position() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

/// One level of interpreter nesting on the current thread, released on drop.
#[must_use]
pub struct CallGuard(());

impl Drop for CallGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Process-wide state shared by every interpreter: the class world, the
/// reflective cache and the stub table.
pub struct Runtime {
    classes: ClassRegistry,
    reflect: ReflectCache,
    stubs: StubLoader,
    max_call_depth: usize,
}

impl Runtime {
    /// A runtime with the builtin `java.lang` classes.
    pub fn new(stubs: StubLoader) -> Self {
        Self::with_classes(ClassRegistry::with_builtins(), stubs)
    }

    pub fn with_classes(classes: ClassRegistry, stubs: StubLoader) -> Self {
        Self {
            classes,
            reflect: ReflectCache::new(),
            stubs,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn max_call_depth(&self) -> usize {
        self.max_call_depth
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn reflect(&self) -> &ReflectCache {
        &self.reflect
    }

    pub fn stubs(&self) -> &StubLoader {
        &self.stubs
    }

    pub fn stub(&self, offset: usize) -> Result<&[Instruction], InterpreterFault> {
        self.stubs.stub(offset)
    }

    /// Enter one more interpreter run on this thread. Past the depth limit or
    /// the native stack budget this throws `StackOverflowError`.
    pub fn enter(&self) -> Result<CallGuard, VmError> {
        let depth = CALL_DEPTH.with(Cell::get);
        let position = stack_position();
        if depth == 0 {
            STACK_BASE.with(|base| base.set(position));
        }
        let used = STACK_BASE.with(Cell::get).abs_diff(position);
        if depth >= self.max_call_depth || used > NATIVE_STACK_BUDGET {
            return Err(self.throw("java.lang.StackOverflowError", None));
        }
        CALL_DEPTH.with(|d| d.set(depth + 1));
        Ok(CallGuard(()))
    }

    /// A fresh throwable of `class`, ready to propagate.
    pub fn throw(&self, class: &str, message: Option<&str>) -> VmError {
        VmError::Thrown(self.classes.new_throwable(class, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::StubTable;

    #[test]
    fn test_call_depth_limit() {
        let runtime = Runtime::new(StubLoader::from_table(StubTable::from_stubs(vec![]))).with_max_call_depth(2);
        let outer = runtime.enter().unwrap();
        let inner = runtime.enter().unwrap();
        let err = runtime.enter().err().unwrap();
        assert_eq!(err.throwable().unwrap().class_name(), "java.lang.StackOverflowError");

        drop(inner);
        let again = runtime.enter().unwrap();
        drop(again);
        drop(outer);
        assert_eq!(CALL_DEPTH.with(Cell::get), 0);
    }
}
