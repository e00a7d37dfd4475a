//! Macro for the string forms of status enums
//!
//! Status columns are stored as lowercase snake_case text and exchanged the
//! same way over the wire. The macro keeps `Display`, `FromStr` and the
//! `as_str` accessor in one place so the three never drift apart.
//!
//! # Example
//!
//! ```rust
//! use studiosync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum RunState {
//!     Idle,
//!     Running,
//! }
//!
//! impl_domain_status_conversions!(RunState {
//!     Idle => "idle",
//!     Running => "running",
//! });
//!
//! assert_eq!(RunState::Running.as_str(), "running");
//! assert_eq!("IDLE".parse::<RunState>(), Ok(RunState::Idle));
//! ```

/// Implements `Display`, `FromStr`, `as_str` and `ALL` for status enums.
///
/// Parsing is case-insensitive; output is always the declared string.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl $enum_name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stable string form used for storage.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
