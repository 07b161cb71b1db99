use std::ffi::CString;

use nix::errno::Errno;

use crate::types::ShellError;

/// Call `f` until it stops failing with EINTR.
pub fn retry_eintr<F, T>(mut f: F) -> nix::Result<T>
where
    F: FnMut() -> nix::Result<T>,
{
    loop {
        match f() {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

pub fn to_cstring(s: &str) -> Result<CString, ShellError> {
    CString::new(s).map_err(|_| ShellError::InvalidArgument(format!("{:?} contains a NUL byte", s)))
}

pub fn to_cstrings(args: &[String]) -> Result<Vec<CString>, ShellError> {
    args.iter().map(|s| to_cstring(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_interior_nul() {
        assert!(to_cstring("ok").is_ok());
        assert!(matches!(to_cstring("b\0ad"), Err(ShellError::InvalidArgument(_))));
    }

    #[test]
    fn retries_on_eintr() {
        let mut calls = 0;
        let result = retry_eintr(|| {
            calls += 1;
            if calls < 3 {
                Err(Errno::EINTR)
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result, Ok(3));
    }
}
