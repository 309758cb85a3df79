/// Subscriber answer to a broadcast, ordered by rank.
///
/// Rank 2 is unused; raw values that do not name a variant read as
/// [`Outcome::Continue`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum Outcome {
    #[default]
    Continue = 0,
    Changed = 1,
    Handled = 3,
    Stop = 4,
}

impl Outcome {
    pub fn from_raw(value: i32) -> Self {
        match value {
            1 => Self::Changed,
            3 => Self::Handled,
            4 => Self::Stop,
            _ => Self::Continue,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Anything above `Continue` asks the caller to act
    pub fn is_action(self) -> bool {
        self > Self::Continue
    }
}

impl From<i32> for Outcome {
    fn from(value: i32) -> Self {
        Self::from_raw(value)
    }
}
