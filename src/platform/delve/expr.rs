/// Quote the package path of a qualified symbol so it is not read as a division
///
/// `example.org/pkg.Symbol` becomes `"example.org/pkg".Symbol`. A leading
/// run of non-letters such as `*&(` stays in front of the quotes. Expressions
/// without a `/`, with quotes or whitespace, or whose last path segment has
/// no member access are returned unchanged.
pub fn quote_package_path(expr: &str) -> String {
    if !expr.contains('/') || expr.contains('"') || expr.chars().any(char::is_whitespace) {
        return expr.to_string();
    }
    let start = expr.find(|c: char| c.is_alphabetic()).unwrap_or(expr.len());
    let (prefix, rest) = expr.split_at(start);
    let Some(slash) = rest.rfind('/') else {
        return expr.to_string();
    };
    let last = &rest[slash + 1..];
    let Some(dot) = last.find('.') else {
        return expr.to_string();
    };
    let split = slash + 1 + dot;
    let (path, suffix) = rest.split_at(split);
    if path.is_empty() {
        return expr.to_string();
    }
    format!("{}\"{}\"{}", prefix, path, suffix)
}
