use crate::{Options, Registry, Runtime, Worksheet};

/// Parse a single-definition source string and create one instance of
/// `def_name` from it, skipping the registry plumbing doctests would
/// otherwise repeat.
///
/// # Example
///
/// ```rust
/// # use worksheet::doc_examples::parse_and_create;
/// # use worksheet::Value;
/// let ws = parse_and_create("type t worksheet { 1:name text }", "t")?;
/// ws.set("name", Value::Text("Ada".into()))?;
/// assert_eq!(ws.get("name")?, Value::Text("Ada".into()));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn parse_and_create(
    source: &str,
    def_name: &str,
) -> Result<Worksheet, Box<dyn std::error::Error>> {
    let registry: std::rc::Rc<Registry> = Runtime::parse(source, Options::new())?;
    Ok(registry.create(def_name)?)
}
