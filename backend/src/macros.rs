//! Shared macros for the backend crate.

/// Implement `fmt::Debug` for a struct while hiding secret fields.
///
/// Each field is listed with a keyword: `show` prints it, `redact` prints
/// `"[REDACTED]"` in its place.
///
/// ```ignore
/// redacted_debug!(Config {
///     show bind_address,
///     redact access_token_secret,
/// });
/// ```
macro_rules! redacted_debug {
    ($name:ident { $( $kind:ident $field:ident ),* $(,)? }) => {
        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let mut s = f.debug_struct(stringify!($name));
                $( redacted_debug!(@field s, self, $kind, $field); )*
                s.finish()
            }
        }
    };
    (@field $s:ident, $self:ident, show, $field:ident) => {
        $s.field(stringify!($field), &$self.$field);
    };
    (@field $s:ident, $self:ident, redact, $field:ident) => {
        $s.field(stringify!($field), &"[REDACTED]");
    };
}

#[cfg(test)]
mod tests {
    #[allow(dead_code)]
    struct Credentials {
        email: String,
        password: String,
    }

    redacted_debug!(Credentials {
        show email,
        redact password,
    });

    #[test]
    fn test_redacted_field_hidden() {
        let creds = Credentials {
            email: "reader@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
        };
        let output = format!("{:?}", creds);
        assert!(output.contains("reader@example.com"));
        assert!(!output.contains("hunter2"));
        assert!(output.contains("[REDACTED]"));
    }
}
