use core::fmt;

/// Whether the accrual loop is supposed to be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityState {
    #[default]
    Inactive,
    Active,
}

impl ActivityState {
    pub fn from_flag(active: bool) -> Self {
        if active { Self::Active } else { Self::Inactive }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}
