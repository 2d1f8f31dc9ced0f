/// Compile a literal regex once per process and hand out a `&'static Regex`.
///
/// Only for patterns that are part of the crate itself; rule-set patterns go
/// through `CompiledRules::compile`, which reports errors instead of panicking.
#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).expect("built-in regex must compile"));
        &*RE
    }};
}
