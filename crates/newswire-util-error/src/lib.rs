use std::{error, fmt, result};

pub type BoxedError = Box<dyn error::Error + Send + Sync + 'static>;
pub type BoxedErrorResult<T> = result::Result<T, BoxedError>;

/// Displays an error followed by every error in its `source()` chain,
/// separated by `": "`.
///
/// Meant for log fields, where the multi-line report produced by
/// `snafu::report` is too noisy.
pub struct CompactErrorChain<'e>(&'e (dyn error::Error + 'e));

impl fmt::Display for CompactErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.0, f)?;

        let mut cause = self.0.source();
        while let Some(err) = cause {
            write!(f, ": {err}")?;
            cause = err.source();
        }

        Ok(())
    }
}

pub trait FmtCompact {
    fn fmt_compact(&self) -> CompactErrorChain<'_>;
}

impl<E> FmtCompact for E
where
    E: error::Error,
{
    fn fmt_compact(&self) -> CompactErrorChain<'_> {
        CompactErrorChain(self)
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;

    #[derive(Debug)]
    struct Layer(&'static str, Option<Box<Layer>>);

    impl fmt::Display for Layer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl error::Error for Layer {
        fn source(&self) -> Option<&(dyn error::Error + 'static)> {
            self.1.as_deref().map(|e| e as _)
        }
    }

    #[test]
    fn chain_is_joined_on_one_line() {
        let err = Layer(
            "publish failed",
            Some(Box::new(Layer(
                "http error",
                Some(Box::new(Layer("connection reset", None))),
            ))),
        );
        assert_eq!(
            err.fmt_compact().to_string(),
            "publish failed: http error: connection reset"
        );
    }
}
