/// Declares one of the W3C string enums. The enum gets an `Unspecified`
/// default at 0, then the listed variants with their discriminant and their
/// IDL string, along with `as_str`, `From<&str>`, `From<u8>` and `Display`.
/// Unknown strings and numbers map to `Unspecified`.
macro_rules! w3c_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $n:literal => $s:literal,
            )+
        }
    ) => {
        $(#[$meta])*
        pub enum $name {
            #[default]
            Unspecified = 0,
            $(
                $(#[$vmeta])*
                $variant = $n,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $name::Unspecified => crate::UNSPECIFIED_STR,
                    $($name::$variant => $s,)+
                }
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                match raw {
                    $($s => $name::$variant,)+
                    _ => $name::Unspecified,
                }
            }
        }

        impl From<u8> for $name {
            fn from(v: u8) -> Self {
                match v {
                    $($n => $name::$variant,)+
                    _ => $name::Unspecified,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
