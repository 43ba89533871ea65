//! Helper macro generating port error enums.
//!
//! For `pub enum FooError { Bar { message: String } => "...", .. }` the macro
//! emits the `thiserror` enum, a snake-case constructor per variant taking
//! `impl Into<_>` arguments, and a payload-free `FooErrorKind` discriminant
//! returned by `FooError::kind()`.

macro_rules! define_port_error {
    (@ctor $variant:ident ($($params:tt)*) ($($inits:tt)*)) => {
        ::paste::paste! {
            #[doc = concat!("Construct a `", stringify!($variant), "` error.")]
            pub fn [<$variant:snake>]($($params)*) -> Self {
                Self::$variant { $($inits)* }
            }
        }
    };

    (@ctor $variant:ident ($($params:tt)*) ($($inits:tt)*) $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @ctor
            $variant
            ($($params)* $field: impl Into<$ty>,)
            ($($inits)* $field: $field.into(),)
            $($rest)*
        );
    };

    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident { $($field:ident : $ty:ty),* $(,)? } => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant { $($field : $ty),* },
            )*
        }

        ::paste::paste! {
            #[doc = concat!("Discriminant of a [`", stringify!($name), "`].")]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub enum [<$name Kind>] {
                $( $variant, )*
            }

            impl $name {
                $(
                    define_port_error!(@ctor $variant () () $( $field : $ty, )*);
                )*

                /// Failure category without its payload.
                pub fn kind(&self) -> [<$name Kind>] {
                    match self {
                        $( Self::$variant { .. } => [<$name Kind>]::$variant, )*
                    }
                }
            }
        }
    };
}

pub(crate) use define_port_error;
