//! Layer selection parsing: `all`, comma lists and `a-b` ranges.

use apicatalog_shared::{CatalogError, MAX_LAYER, MIN_LAYER, Result, is_valid_layer};

/// Parse a layer selection such as `"all"`, `"1,3"`, `"2-5"` or `"1,4-6"`.
///
/// `"all"` expands to `registered`. Explicit layers keep the caller's order
/// with repeats removed. Malformed input and layers outside 1–12 are
/// configuration errors. Whether an explicit layer has an adapter is checked
/// later, by the orchestrator.
pub fn parse_layer_selection(input: &str, registered: &[u8]) -> Result<Vec<u8>> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("all") {
        return Ok(registered.to_vec());
    }

    let mut layers = Vec::new();
    for part in input.split(',').map(str::trim) {
        if part.is_empty() {
            return Err(CatalogError::config(format!("empty entry in layer selection '{input}'")));
        }
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => (parse_layer(a)?, parse_layer(b)?),
            None => {
                let layer = parse_layer(part)?;
                (layer, layer)
            }
        };
        if start > end {
            return Err(CatalogError::config(format!("descending layer range '{part}'")));
        }
        for layer in start..=end {
            if !layers.contains(&layer) {
                layers.push(layer);
            }
        }
    }
    Ok(layers)
}

fn parse_layer(text: &str) -> Result<u8> {
    let text = text.trim();
    let layer: u8 = text
        .parse()
        .map_err(|_| CatalogError::config(format!("'{text}' is not a layer number")))?;
    if !is_valid_layer(layer) {
        return Err(CatalogError::config(format!(
            "layer {layer} outside {MIN_LAYER}-{MAX_LAYER}"
        )));
    }
    Ok(layer)
}
