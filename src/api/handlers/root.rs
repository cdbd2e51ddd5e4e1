// Undocumented banner route, useful for quick smoke checks.
pub async fn root() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
