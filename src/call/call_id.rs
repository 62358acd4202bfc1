use std::fmt;

/// CallId correlates a request with its reply. Values <= 0 never identify a real call.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallId(i32);

impl CallId {
    /// Placeholder carried by messages that are not part of a call (peer traffic, notifications).
    pub const NONE: CallId = CallId(0);

    pub fn new(id: i32) -> Self {
        CallId(id)
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Debug for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out monotonically increasing call ids, wrapping from `i32::MAX` back to 1.
#[derive(Debug)]
pub(crate) struct CallIdAllocator {
    last: i32,
}

impl CallIdAllocator {
    pub(crate) fn new() -> Self {
        CallIdAllocator { last: 0 }
    }

    #[cfg(test)]
    fn starting_after(last: i32) -> Self {
        CallIdAllocator { last }
    }

    pub(crate) fn next(&mut self) -> CallId {
        self.last = match self.last.checked_add(1) {
            Some(next) if next > 0 => next,
            _ => 1,
        };
        CallId(self.last)
    }
}
