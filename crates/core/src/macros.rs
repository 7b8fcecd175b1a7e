// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros shared across the workspace.
//!
//! - [`text_enum!`] — matched `Display`/`parse_str` pair for state enums
//!   that travel as text
//! - [`builder!`] — test builder seeded with a fully-formed default value

/// Define the canonical text form of a unit-variant enum.
///
/// Run and coordination state cross storage boundaries as plain text: run
/// states and continuation states live in TEXT columns, roles in the
/// directory hash, result codes on the wire. Writing and re-reading them
/// must agree exactly, so both directions come from one table: `Display`
/// emits the canonical string and `parse_str` accepts nothing else.
///
/// Variants carrying data have no single canonical string and do not
/// belong here; give them a hand-written `Display`.
///
/// ```ignore
/// gaffer_core::text_enum! {
///     Role {
///         Leader => "leader",
///         SubLeader => "sub-leader",
///         Worker => "worker",
///     }
/// }
/// assert_eq!(Role::parse_str("sub-leader"), Some(Role::SubLeader));
/// ```
#[macro_export]
macro_rules! text_enum {
    ($enum:ty { $( $variant:ident => $str:expr ),+ $(,)? }) => {
        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(match self {
                    $( Self::$variant => $str, )+
                })
            }
        }

        impl $enum {
            /// Parse the canonical text form produced by `Display`.
            /// Returns `None` for anything else, including case variants.
            pub fn parse_str(s: &str) -> Option<Self> {
                match s {
                    $( $str => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

/// Generate a test builder (struct + Default + setters + build).
///
/// The builder wraps a fully-formed `$target` seeded with the listed
/// defaults; setters overwrite fields in place and `build()` unwraps it.
/// Every field of the target must appear in exactly one group, so adding
/// a field without a test default is a compile error at the builder.
///
/// All generated items are gated behind `#[cfg(any(test, feature = "test-support"))]`.
///
/// Field groups:
/// - `into { field: Type = default }` — setter takes `impl Into<Type>`
/// - `set { field: Type = default }` — setter takes `Type` directly
/// - `option { field: Type = default }` — target field is `Option<Type>`,
///   setter wraps in `Some(v.into())`
///
/// ```ignore
/// gaffer_core::builder! {
///     pub struct WorkerEntryBuilder => WorkerEntry {
///         into { worker_id: WorkerId = "w1" }
///         set { load: u32 = 0 }
///         option { current_run_id: RunId = None }
///     }
/// }
/// ```
#[macro_export]
macro_rules! builder {
    (
        pub struct $builder:ident => $target:ident {
            $(into {
                $( $into_field:ident : $into_ty:ty = $into_default:expr ),* $(,)?
            })?
            $(set {
                $( $set_field:ident : $set_ty:ty = $set_default:expr ),* $(,)?
            })?
            $(option {
                $( $opt_field:ident : $opt_ty:ty = $opt_default:expr ),* $(,)?
            })?
        }
    ) => {
        #[cfg(any(test, feature = "test-support"))]
        pub struct $builder($target);

        #[cfg(any(test, feature = "test-support"))]
        impl Default for $builder {
            fn default() -> Self {
                Self($target {
                    $($( $into_field: $into_default.into(), )*)?
                    $($( $set_field: $set_default, )*)?
                    $($( $opt_field: $opt_default, )*)?
                })
            }
        }

        #[cfg(any(test, feature = "test-support"))]
        impl $builder {
            $($(
                pub fn $into_field(mut self, v: impl Into<$into_ty>) -> Self {
                    self.0.$into_field = v.into();
                    self
                }
            )*)?

            $($(
                pub fn $set_field(mut self, v: $set_ty) -> Self {
                    self.0.$set_field = v;
                    self
                }
            )*)?

            $($(
                pub fn $opt_field(mut self, v: impl Into<$opt_ty>) -> Self {
                    self.0.$opt_field = Some(v.into());
                    self
                }
            )*)?

            pub fn build(self) -> $target {
                self.0
            }
        }

        #[cfg(any(test, feature = "test-support"))]
        impl $target {
            /// Create a builder with test defaults.
            pub fn builder() -> $builder {
                $builder::default()
            }
        }
    };
}
