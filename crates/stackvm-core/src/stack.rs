//! Integrity-checked operand stack
//!
//! [`GuardedStack`] is the operand stack of the VM. Every mutation is
//! bracketed by a full self-check, so a stray write into the stack's memory
//! is caught at the next operation instead of silently corrupting results.
//!
//! # Memory Layout
//!
//! ```text
//! index:   0          1 .. size       size+1 .. capacity   capacity+1
//!        ┌──────────┬───────────────┬────────────────────┬──────────┐
//!        │ sentinel │ live values   │ free (poison)      │ sentinel │
//!        └──────────┴───────────────┴────────────────────┴──────────┘
//! ```
//!
//! Sentinels and free cells hold the poison value. Two canary fields that
//! must stay zero bracket the control data, and a CRC-32 over the buffer and
//! control fields is refreshed after every mutation.
//!
//! # Verification order
//!
//! canaries → checksum → free-cell poison → sentinels. The first violation
//! found is reported.

use rand::Rng;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

/// Conventional file name for a [`DumpSink::File`] sink
pub const DEFAULT_DUMP_LOG: &str = "stackvm-stack.log";

/// Value both canary fields must hold
const CANARY: u64 = 0;

/// Element type storable in a [`GuardedStack`]
pub trait StackElement: Copy + PartialEq + fmt::Debug + fmt::Display + 'static {
    /// Fixed-width byte view
    type Bytes: AsRef<[u8]>;

    /// Little-endian bytes, used for checksums and poison comparison
    fn to_bytes(self) -> Self::Bytes;

    /// A random value, used when no poison is configured
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self;
}

macro_rules! impl_stack_element {
    ($($ty:ty),* $(,)?) => {$(
        impl StackElement for $ty {
            type Bytes = [u8; std::mem::size_of::<$ty>()];

            #[inline]
            fn to_bytes(self) -> Self::Bytes {
                self.to_le_bytes()
            }

            fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
                rng.gen()
            }
        }
    )*};
}

impl_stack_element!(i32, i64, u8, u32, u64, f64);

/// Stack verification result codes
///
/// Failure codes are distinct bit flags; the numeric value is printed in dumps.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Stack is consistent
    NoError = -1,
    /// Informational dump, no failure
    NoErrorRunOfDump = 0,
    /// Pop from an empty stack
    PopFromEmptyStack = 2,
    /// Leading canary field changed
    BeginningPointWrongValue = 4,
    /// Trailing canary field changed
    EndingPointWrongValue = 8,
    /// Stored checksum does not match the contents
    HashWrongValue = 16,
    /// A free cell no longer holds the poison value
    BufferPoisonValueWarning = 32,
    /// A sentinel cell no longer holds the poison value
    BufferSentinelWrongValue = 64,
}

impl ErrorCode {
    /// Numeric code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether execution may continue after this code has been dumped
    pub fn is_survivable(self) -> bool {
        matches!(
            self,
            Self::NoError
                | Self::NoErrorRunOfDump
                | Self::PopFromEmptyStack
                | Self::BufferPoisonValueWarning
        )
    }

    /// Short description used in dumps
    pub fn description(self) -> &'static str {
        match self {
            Self::NoError => "no error",
            Self::NoErrorRunOfDump => "dump requested",
            Self::PopFromEmptyStack => "pop from empty stack",
            Self::BeginningPointWrongValue => "beginning canary overwritten",
            Self::EndingPointWrongValue => "ending canary overwritten",
            Self::HashWrongValue => "checksum mismatch",
            Self::BufferPoisonValueWarning => "free cell overwritten",
            Self::BufferSentinelWrongValue => "sentinel cell overwritten",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.description())
    }
}

/// Errors returned by stack operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StackError {
    /// Pop from an empty stack through [`GuardedStack::try_pop`]
    #[error("Pop from empty stack")]
    PopFromEmptyStack,

    /// Unrecoverable failure: corruption, or an empty pop through [`GuardedStack::pop`]
    #[error("Fatal stack error: {code}")]
    Fatal {
        /// Code reported by the failing check
        code: ErrorCode,
    },
}

/// Stack operation result
pub type StackResult<T> = Result<T, StackError>;

/// Destination of stack dumps
pub enum DumpSink {
    /// Standard error
    Stderr,
    /// File opened in append mode for every dump
    File(PathBuf),
    /// Arbitrary writer
    Writer(Box<dyn Write + Send>),
    /// In-memory buffer, readable through [`GuardedStack::dump_output`]
    Memory(Vec<u8>),
    /// Drop dumps
    Discard,
}

impl DumpSink {
    fn emit(&mut self, report: &str) -> io::Result<()> {
        match self {
            Self::Stderr => io::stderr().lock().write_all(report.as_bytes()),
            Self::File(path) => OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?
                .write_all(report.as_bytes()),
            Self::Writer(writer) => {
                writer.write_all(report.as_bytes())?;
                writer.flush()
            }
            Self::Memory(buffer) => {
                buffer.extend_from_slice(report.as_bytes());
                Ok(())
            }
            Self::Discard => Ok(()),
        }
    }
}

impl Default for DumpSink {
    fn default() -> Self {
        Self::Stderr
    }
}

impl fmt::Debug for DumpSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stderr => f.write_str("Stderr"),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Writer(_) => f.write_str("Writer(..)"),
            Self::Memory(buffer) => write!(f, "Memory({} bytes)", buffer.len()),
            Self::Discard => f.write_str("Discard"),
        }
    }
}

/// Guarded stack construction options
#[derive(Debug)]
pub struct StackOptions<T> {
    /// Name printed in dumps
    pub name: String,
    /// Poison value; random when `None`
    pub poison: Option<T>,
    /// Initial capacity (at least 1)
    pub initial_capacity: usize,
    /// Where dumps are written
    pub sink: DumpSink,
}

impl<T> Default for StackOptions<T> {
    fn default() -> Self {
        Self {
            name: "stack".to_string(),
            poison: None,
            initial_capacity: 1,
            sink: DumpSink::default(),
        }
    }
}

/// Integrity-checked LIFO stack
#[derive(Debug)]
pub struct GuardedStack<T: StackElement> {
    beginning_point: u64,
    name: String,
    /// `capacity + 2` cells, sentinels at both ends
    buffer: Vec<T>,
    size: usize,
    capacity: usize,
    poison: T,
    checksum: u32,
    sink: DumpSink,
    ending_point: u64,
}

impl<T: StackElement> GuardedStack<T> {
    /// Create a stack
    pub fn new(options: StackOptions<T>) -> Self {
        let poison = options
            .poison
            .unwrap_or_else(|| T::random(&mut rand::thread_rng()));
        let capacity = options.initial_capacity.max(1);

        let mut stack = Self {
            beginning_point: CANARY,
            name: options.name,
            buffer: vec![poison; capacity + 2],
            size: 0,
            capacity,
            poison,
            checksum: 0,
            sink: options.sink,
            ending_point: CANARY,
        };
        stack.rehash();
        stack
    }

    /// Create a stack with a fixed poison value and default options
    pub fn with_poison(poison: T) -> Self {
        Self::new(StackOptions {
            poison: Some(poison),
            ..StackOptions::default()
        })
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Push a value, doubling the capacity when full
    pub fn push(&mut self, value: T) -> StackResult<()> {
        self.guard("push (before)")?;

        if self.size == self.capacity {
            self.grow();
        }
        self.size += 1;
        self.buffer[self.size] = value;
        self.rehash();

        self.guard("push (after)")
    }

    /// Pop the top value
    ///
    /// # Errors
    ///
    /// An empty stack is dumped with [`ErrorCode::PopFromEmptyStack`] and
    /// reported as [`StackError::Fatal`]. Use [`try_pop`](Self::try_pop) when
    /// emptiness is expected.
    pub fn pop(&mut self) -> StackResult<T> {
        self.guard("pop (before)")?;

        if self.size == 0 {
            self.dump(ErrorCode::PopFromEmptyStack, "pop");
            return Err(StackError::Fatal {
                code: ErrorCode::PopFromEmptyStack,
            });
        }
        self.remove_top()
    }

    /// Pop the top value, reporting an empty stack as a recoverable error
    pub fn try_pop(&mut self) -> StackResult<T> {
        self.guard("try_pop (before)")?;

        if self.size == 0 {
            self.dump(ErrorCode::PopFromEmptyStack, "try_pop");
            return Err(StackError::PopFromEmptyStack);
        }
        self.remove_top()
    }

    fn remove_top(&mut self) -> StackResult<T> {
        let value = self.buffer[self.size];
        self.buffer[self.size] = self.poison;
        self.size -= 1;
        self.rehash();

        self.guard("pop (after)")?;
        Ok(value)
    }

    fn grow(&mut self) {
        let capacity = self.capacity * 2;
        // The old trailing sentinel becomes a free cell; both hold poison
        self.buffer.resize(capacity + 2, self.poison);
        self.capacity = capacity;
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Check the stack's integrity
    pub fn verify(&self) -> ErrorCode {
        if self.beginning_point != CANARY {
            return ErrorCode::BeginningPointWrongValue;
        }
        if self.ending_point != CANARY {
            return ErrorCode::EndingPointWrongValue;
        }
        if self.checksum != self.compute_checksum() {
            return ErrorCode::HashWrongValue;
        }

        let free = self
            .buffer
            .get(self.size + 1..=self.capacity)
            .unwrap_or(&[]);
        if free.iter().any(|&cell| !self.is_poison(cell)) {
            return ErrorCode::BufferPoisonValueWarning;
        }

        let sentinels_intact = [self.buffer.first(), self.buffer.get(self.capacity + 1)]
            .into_iter()
            .all(|cell| cell.is_some_and(|&cell| self.is_poison(cell)));
        if !sentinels_intact {
            return ErrorCode::BufferSentinelWrongValue;
        }

        ErrorCode::NoError
    }

    /// Verify and dump on failure; fatal codes become errors
    fn guard(&mut self, context: &str) -> StackResult<()> {
        let code = self.verify();
        if code == ErrorCode::NoError {
            return Ok(());
        }

        if self.dump(code, context) {
            crate::warn!("stack \"{}\": {} in {}", self.name, code, context);
            Ok(())
        } else {
            crate::error!("stack \"{}\": {} in {}", self.name, code, context);
            Err(StackError::Fatal { code })
        }
    }

    fn compute_checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for &cell in &self.buffer {
            hasher.update(cell.to_bytes().as_ref());
        }
        hasher.update(&(self.size as u64).to_le_bytes());
        hasher.update(&(self.capacity as u64).to_le_bytes());
        hasher.update(self.poison.to_bytes().as_ref());
        hasher.update(&self.beginning_point.to_le_bytes());
        hasher.update(&self.ending_point.to_le_bytes());
        hasher.finalize()
    }

    fn rehash(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Bitwise comparison, so a NaN poison still matches itself
    fn is_poison(&self, cell: T) -> bool {
        cell.to_bytes().as_ref() == self.poison.to_bytes().as_ref()
    }

    // ========================================================================
    // Dumps
    // ========================================================================

    /// Write a structured report of the stack to its dump sink
    ///
    /// Returns whether `code` is survivable. Failing to write the report is
    /// logged and does not change the result.
    pub fn dump(&mut self, code: ErrorCode, context: &str) -> bool {
        let report = Dump {
            stack: &*self,
            code,
            context,
        }
        .to_string();

        if let Err(err) = self.sink.emit(&report) {
            crate::warn!("failed to write dump of stack \"{}\": {}", self.name, err);
        }
        code.is_survivable()
    }

    /// Contents of a [`DumpSink::Memory`] sink
    pub fn dump_output(&self) -> Option<&str> {
        match &self.sink {
            DumpSink::Memory(buffer) => std::str::from_utf8(buffer).ok(),
            _ => None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Number of live values
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Check if stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of values that fit before the next growth
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Top value, if any
    pub fn peek(&self) -> Option<T> {
        (self.size > 0).then(|| self.buffer[self.size])
    }

    /// Poison value
    pub fn poison(&self) -> T {
        self.poison
    }

    /// Name used in dumps
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Live values, bottom to top
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.buffer[1..=self.size].iter().copied()
    }
}

impl<T: StackElement> Default for GuardedStack<T> {
    fn default() -> Self {
        Self::new(StackOptions::default())
    }
}

/// Printable stack report
struct Dump<'a, T: StackElement> {
    stack: &'a GuardedStack<T>,
    code: ErrorCode,
    context: &'a str,
}

impl<T: StackElement> fmt::Display for Dump<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = self.stack;
        let header = match self.code {
            ErrorCode::NoError | ErrorCode::NoErrorRunOfDump => "Dump requested",
            _ => "Verification failed",
        };

        writeln!(f, "{} from {}", header, self.context)?;
        writeln!(
            f,
            "GuardedStack<{}> \"{}\" {{",
            std::any::type_name::<T>(),
            stack.name
        )?;
        writeln!(
            f,
            "  ErrorCode = {} ({})",
            self.code.code(),
            self.code.description()
        )?;
        writeln!(f, "  size = {}", stack.size)?;
        writeln!(f, "  capacity = {}", stack.capacity)?;
        writeln!(f, "  poison = {}", stack.poison)?;
        writeln!(
            f,
            "  checksum = {:#010x} (computed {:#010x})",
            stack.checksum,
            stack.compute_checksum()
        )?;
        writeln!(f, "  canaries = [{}, {}]", stack.beginning_point, stack.ending_point)?;
        writeln!(f, "  buffer[{}] = [", stack.buffer.len())?;

        for (index, &cell) in stack.buffer.iter().enumerate() {
            let live = (1..=stack.size).contains(&index);
            let poisoned = stack.is_poison(cell);
            let note = if index == 0 || index == stack.capacity + 1 {
                if poisoned {
                    " (SENTINEL)"
                } else {
                    " (SENTINEL OVERWRITTEN)"
                }
            } else if live {
                ""
            } else if poisoned {
                " (POISON)"
            } else {
                " (EXPECTED POISON)"
            };
            let marker = if live { '*' } else { ' ' };
            writeln!(f, "   {}[{}] = {}{}", marker, index, cell, note)?;
        }

        writeln!(f, "  ]")?;
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POISON: i32 = -0x0BAD_F00D;

    fn quiet_stack() -> GuardedStack<i32> {
        GuardedStack::new(StackOptions {
            name: "test".to_string(),
            poison: Some(POISON),
            initial_capacity: 1,
            sink: DumpSink::Memory(Vec::new()),
        })
    }

    #[test]
    fn test_stack_creation() {
        let stack = quiet_stack();
        assert!(stack.is_empty());
        assert_eq!(stack.capacity(), 1);
        assert_eq!(stack.buffer.len(), 3);
        assert_eq!(stack.verify(), ErrorCode::NoError);
    }

    #[test]
    fn test_with_poison_defaults() {
        let stack = GuardedStack::with_poison(7u8);
        assert_eq!(stack.name(), "stack");
        assert_eq!(stack.poison(), 7);
        assert_eq!(stack.capacity(), 1);
        assert_eq!(stack.verify(), ErrorCode::NoError);
    }

    #[test]
    fn test_push_pop() {
        let mut stack = quiet_stack();

        stack.push(42).unwrap();
        stack.push(100).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.peek(), Some(100));

        assert_eq!(stack.pop().unwrap(), 100);
        assert_eq!(stack.pop().unwrap(), 42);
        assert!(stack.is_empty());
        assert_eq!(stack.verify(), ErrorCode::NoError);
    }

    #[test]
    fn test_growth_doubles_and_keeps_sentinels() {
        let mut stack = quiet_stack();
        let mut expected_capacity = 1;

        for value in 0..33 {
            stack.push(value).unwrap();
            if value as usize >= expected_capacity {
                expected_capacity *= 2;
            }
            assert_eq!(stack.capacity(), expected_capacity);
            assert_eq!(stack.buffer[0], POISON);
            assert_eq!(stack.buffer[stack.capacity() + 1], POISON);
            assert_eq!(stack.verify(), ErrorCode::NoError);
        }

        assert_eq!(stack.capacity(), 64);
        assert!(stack.iter().eq(0..33));
    }

    #[test]
    fn test_popped_cells_are_poisoned() {
        let mut stack = quiet_stack();
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        stack.pop().unwrap();

        assert_eq!(stack.buffer[2], POISON);
        assert_eq!(stack.verify(), ErrorCode::NoError);
    }

    #[test]
    fn test_pop_empty_is_fatal() {
        let mut stack = quiet_stack();
        let result = stack.pop();
        assert_eq!(
            result,
            Err(StackError::Fatal {
                code: ErrorCode::PopFromEmptyStack
            })
        );
        assert!(stack.dump_output().unwrap().contains("ErrorCode = 2"));
    }

    #[test]
    fn test_try_pop_empty_is_recoverable() {
        let mut stack = quiet_stack();
        assert_eq!(stack.try_pop(), Err(StackError::PopFromEmptyStack));
        assert_eq!(stack.len(), 0);

        stack.push(7).unwrap();
        assert_eq!(stack.try_pop(), Ok(7));
    }

    #[test]
    fn test_sentinel_overwrite_detected() {
        let mut stack = quiet_stack();
        stack.push(1).unwrap();

        stack.buffer[0] = 99;
        assert_eq!(stack.verify(), ErrorCode::HashWrongValue);

        // Same write with a refreshed checksum reaches the sentinel check
        stack.rehash();
        assert_eq!(stack.verify(), ErrorCode::BufferSentinelWrongValue);
    }

    #[test]
    fn test_trailing_sentinel_overwrite_detected() {
        let mut stack = quiet_stack();
        let last = stack.capacity() + 1;
        stack.buffer[last] = 0;
        stack.rehash();
        assert_eq!(stack.verify(), ErrorCode::BufferSentinelWrongValue);
    }

    #[test]
    fn test_free_cell_overwrite_detected() {
        let mut stack = quiet_stack();
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        stack.pop().unwrap();

        stack.buffer[2] = 5;
        stack.rehash();
        assert_eq!(stack.verify(), ErrorCode::BufferPoisonValueWarning);
    }

    #[test]
    fn test_free_cell_warning_is_survivable() {
        let mut stack = quiet_stack();
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        stack.pop().unwrap();
        stack.buffer[2] = 5;
        stack.rehash();

        // Overwritten by the push itself
        stack.push(3).unwrap();
        assert_eq!(stack.verify(), ErrorCode::NoError);
        assert!(stack.dump_output().unwrap().contains("EXPECTED POISON"));
    }

    #[test]
    fn test_checksum_tamper_detected() {
        let mut stack = quiet_stack();
        stack.push(1).unwrap();
        stack.checksum ^= 1;
        assert_eq!(stack.verify(), ErrorCode::HashWrongValue);
    }

    #[test]
    fn test_canary_tamper_detected() {
        let mut stack = quiet_stack();
        stack.beginning_point = 1;
        assert_eq!(stack.verify(), ErrorCode::BeginningPointWrongValue);

        stack.beginning_point = CANARY;
        stack.ending_point = 0xDEAD;
        assert_eq!(stack.verify(), ErrorCode::EndingPointWrongValue);
    }

    #[test]
    fn test_corrupted_stack_refuses_operations() {
        let mut stack = quiet_stack();
        stack.push(10).unwrap();
        stack.size = 0;

        assert_eq!(
            stack.push(20),
            Err(StackError::Fatal {
                code: ErrorCode::HashWrongValue
            })
        );
        assert!(stack.dump_output().unwrap().contains("Verification failed"));
    }

    #[test]
    fn test_dump_on_demand() {
        let mut stack = quiet_stack();
        stack.push(10).unwrap();
        stack.push(20).unwrap();

        assert!(stack.dump(ErrorCode::NoErrorRunOfDump, "inspection"));
        let dump = stack.dump_output().unwrap();
        assert!(dump.starts_with("Dump requested from inspection"));
        assert!(dump.contains("\"test\""));
        assert!(dump.contains("size = 2"));
        assert!(dump.contains("*[1] = 10"));
        assert!(dump.contains("*[2] = 20"));
        assert!(dump.contains("(SENTINEL)"));
    }

    #[test]
    fn test_survivable_codes() {
        assert!(ErrorCode::NoError.is_survivable());
        assert!(ErrorCode::NoErrorRunOfDump.is_survivable());
        assert!(ErrorCode::PopFromEmptyStack.is_survivable());
        assert!(ErrorCode::BufferPoisonValueWarning.is_survivable());
        assert!(!ErrorCode::BeginningPointWrongValue.is_survivable());
        assert!(!ErrorCode::EndingPointWrongValue.is_survivable());
        assert!(!ErrorCode::HashWrongValue.is_survivable());
        assert!(!ErrorCode::BufferSentinelWrongValue.is_survivable());
    }

    #[test]
    fn test_nan_poison_matches_itself() {
        let mut stack = GuardedStack::new(StackOptions {
            poison: Some(f64::NAN),
            sink: DumpSink::Discard,
            ..StackOptions::default()
        });
        stack.push(1.5).unwrap();
        stack.push(2.5).unwrap();
        assert_eq!(stack.pop().unwrap(), 2.5);
        assert_eq!(stack.verify(), ErrorCode::NoError);
    }

    #[test]
    fn test_random_poison_is_stable() {
        let mut stack: GuardedStack<u64> = GuardedStack::new(StackOptions {
            sink: DumpSink::Discard,
            ..StackOptions::default()
        });
        let poison = stack.poison();
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        assert_eq!(stack.poison(), poison);
        assert_eq!(stack.buffer[0].to_le_bytes(), poison.to_le_bytes());
    }
}
