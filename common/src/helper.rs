/// Formats an error and the chain of its sources, one cause per line.
///
/// Used by the `Debug` implementation of our error enums so that logging an
/// error with `?error` shows the full context instead of only the top level.
pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;

    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }

    Ok(())
}
