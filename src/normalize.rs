//! Rewrites schema variants in the raw credential JSON.
//!
//! Older issuer profiles encode `HumanName.family` as an array of strings while
//! newer ones use a single string. The array form is collapsed into one string
//! before the payload is parsed.

use std::borrow::Cow;

use crate::error::DecodeError;

const FAMILY_KEY: &str = "\"family\"";

/// Replaces every array-valued `"family"` field with a single string.
///
/// An empty array becomes `""`, several names are joined with a single space.
/// All other text is preserved byte for byte, so text without an array-valued
/// family field is returned unchanged (and borrowed).
///
/// # Arguments
/// * `text` - The inflated credential JSON
///
/// # Returns
/// * `Result<Cow<str>, DecodeError>` - The normalized text, or `Schema` if a
///   matched array is not a well-formed array of strings
pub fn normalize_family_names(text: &str) -> Result<Cow<'_, str>, DecodeError> {
    let mut normalized: Option<String> = None;
    let mut copied = 0;
    let mut search = 0;

    while let Some(found) = text[search..].find(FAMILY_KEY) {
        let key_start = search + found;
        search = key_start + FAMILY_KEY.len();

        // an escaped quote means we are inside a string value
        if text[..key_start].ends_with('\\') {
            continue;
        }

        let Some(value) = text[search..]
            .trim_start()
            .strip_prefix(':')
            .map(str::trim_start)
        else {
            continue;
        };
        if !value.starts_with('[') {
            continue;
        }
        let array_start = text.len() - value.len();

        let mut stream = serde_json::Deserializer::from_str(value).into_iter::<Vec<String>>();
        let names = match stream.next() {
            Some(Ok(names)) => names,
            Some(Err(e)) => {
                return Err(DecodeError::Schema(format!(
                    "malformed family name array at byte {array_start}: {e}"
                )))
            }
            None => {
                return Err(DecodeError::Schema(format!(
                    "missing family name array at byte {array_start}"
                )))
            }
        };
        let array_end = array_start + stream.byte_offset();

        log::trace!(
            "Collapsing family name array of {} element(s) at byte {array_start}",
            names.len()
        );

        let replacement = serde_json::to_string(&names.join(" "))?;

        let out = normalized.get_or_insert_with(|| String::with_capacity(text.len()));
        out.push_str(&text[copied..array_start]);
        out.push_str(&replacement);

        copied = array_end;
        search = array_end;
    }

    match normalized {
        Some(mut out) => {
            out.push_str(&text[copied..]);
            Ok(Cow::Owned(out))
        }
        None => Ok(Cow::Borrowed(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    macro_rules! tests {
        ($($name:ident: $input:literal => $expected:literal),* $(,)?) => {
            $(
                #[test]
                fn $name() {
                    let computed = normalize_family_names($input).unwrap();
                    assert_eq!(computed, $expected);
                }
            )*
        };
    }

    tests! {
        empty_array: r#""family":[],""# => r#""family":"",""#,
        single_name: r#""family":["Doe"],"# => r#""family":"Doe","#,
        two_names: r#""family":["Doe","Deere"],"# => r#""family":"Doe Deere","#,
        spaced: r#"{"family" : [ "Doe" , "Deere" ] , "given":["J"]}"# => r#"{"family" : "Doe Deere" , "given":["J"]}"#,
        escaped_names: r#"{"family":["O\"Brien","Zoë"]}"# => r#"{"family":"O\"Brien Zoë"}"#,
        no_family: r#"{"given":["Jean"]}"# => r#"{"given":["Jean"]}"#,
        scalar_family: r#"{"family":"Biche","given":["Jean"]}"# => r#"{"family":"Biche","given":["Jean"]}"#,
        inside_string_value: r#"{"text":"\"family\":[\"x\"]"}"# => r#"{"text":"\"family\":[\"x\"]"}"#,
        family_as_value: r#"{"use":"family","given":["a"]}"# => r#"{"use":"family","given":["a"]}"#,
    }

    #[test]
    fn rewrites_every_occurrence() {
        let input = r#"{"entry":[{"resource":{"resourceType":"Patient","name":[{"family":["Biche"],"given":["Jean"]},{"family":[],"given":["J."]}]}},{"resource":{"resourceType":"Patient","name":[{"family":["Doe","Deere"]}]}}]}"#;
        let expected = r#"{"entry":[{"resource":{"resourceType":"Patient","name":[{"family":"Biche","given":["Jean"]},{"family":"","given":["J."]}]}},{"resource":{"resourceType":"Patient","name":[{"family":"Doe Deere"}]}}]}"#;

        let computed = normalize_family_names(input).unwrap();
        assert_eq!(computed, expected);

        let parsed: serde_json::Value = serde_json::from_str(&computed).unwrap();
        assert_eq!(
            parsed["entry"][1]["resource"]["name"][0]["family"],
            "Doe Deere"
        );
    }

    #[test]
    fn unchanged_text_is_borrowed() {
        let input = r#"{"name":[{"family":"Biche"}]}"#;
        assert!(matches!(
            normalize_family_names(input).unwrap(),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn idempotent() {
        let input = r#"{"name":[{"family":["Doe","Deere"],"given":["Jane"]}]}"#;
        let once = normalize_family_names(input).unwrap().into_owned();
        let twice = normalize_family_names(&once).unwrap();
        assert_eq!(twice, once);
        assert!(matches!(twice, Cow::Borrowed(_)));
    }

    #[test]
    fn malformed_arrays_are_schema_errors() {
        for input in [
            r#"{"family":["Doe",]}"#,
            r#"{"family":["Doe""#,
            r#"{"family":[1,2]}"#,
            r#"{"family":[["Doe"]]}"#,
        ] {
            let err = normalize_family_names(input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SchemaError, "input {input}");
        }
    }
}
