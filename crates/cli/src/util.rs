use typed_path::Utf8NativePathBuf;

/// Parse a path argument for `argp::FromArgs`. Any string is a valid path.
pub fn native_path(value: &str) -> Result<Utf8NativePathBuf, String> {
    Ok(Utf8NativePathBuf::from(value))
}
