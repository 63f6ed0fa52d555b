//! JSON rendering of a [`Reference`].

use std::fmt::Write;

use crate::types::FlexType;

use super::Reference;

/// Containers nested deeper than this render as `null`
const MAX_DEPTH: usize = 64;

/// Values rendered per buffer byte before output stops
///
/// Without reuse every value owns at least one slot byte. Corrupted offsets
/// can make containers share or contain each other, which would otherwise
/// grow the output exponentially with depth.
const VISITS_PER_BYTE: usize = 4;

impl Reference<'_> {
    /// Renders the value as compact JSON
    ///
    /// Map keys come out in their stored (sorted) order. Blobs become
    /// strings, non-finite floats and unreadable values become `null`.
    /// Once more values than a small multiple of the buffer length have been
    /// written, the remaining containers are closed without their elements.
    pub fn to_json(&self) -> String {
        let mut renderer = Renderer {
            out: String::new(),
            budget: self.buffer().len().saturating_mul(VISITS_PER_BYTE),
        };
        renderer.value(self, 0);
        renderer.out
    }
}

struct Renderer {
    out: String,
    budget: usize,
}

impl Renderer {
    fn value(&mut self, value: &Reference<'_>, depth: usize) {
        self.budget = self.budget.saturating_sub(1);
        let ty = value.flex_type();
        if depth < MAX_DEPTH {
            if ty == FlexType::Map {
                return self.map(value, depth);
            }
            if ty.is_vector() {
                return self.vector(value, depth);
            }
        }
        let out = &mut self.out;
        match ty {
            FlexType::Bool => out.push_str(if value.as_bool() { "true" } else { "false" }),
            FlexType::Int | FlexType::IndirectInt => match value.get_i64() {
                Ok(i) => push_display(out, i),
                Err(_) => out.push_str("null"),
            },
            FlexType::UInt | FlexType::IndirectUInt => match value.get_u64() {
                Ok(u) => push_display(out, u),
                Err(_) => out.push_str("null"),
            },
            FlexType::Float | FlexType::IndirectFloat => match value.get_f64() {
                Ok(f) => write_float(out, f),
                Err(_) => out.push_str("null"),
            },
            FlexType::String | FlexType::Key => match value.get_str() {
                Ok(s) => write_string(out, s),
                Err(_) => out.push_str("null"),
            },
            FlexType::Blob => match value.get_blob() {
                Ok(bytes) => write_string(out, &String::from_utf8_lossy(bytes)),
                Err(_) => out.push_str("null"),
            },
            _ => out.push_str("null"),
        }
    }

    fn map(&mut self, value: &Reference<'_>, depth: usize) {
        let Ok(map) = value.get_map() else {
            self.out.push_str("null");
            return;
        };
        self.out.push('{');
        for (i, entry) in map.iter().enumerate() {
            if self.budget == 0 {
                break;
            }
            if i > 0 {
                self.out.push(',');
            }
            match entry {
                Ok((key, value)) => {
                    write_string(&mut self.out, key);
                    self.out.push(':');
                    self.value(&value, depth + 1);
                }
                Err(_) => self.out.push_str("\"\":null"),
            }
        }
        self.out.push('}');
    }

    fn vector(&mut self, value: &Reference<'_>, depth: usize) {
        let Ok(vector) = value.get_vector() else {
            self.out.push_str("null");
            return;
        };
        self.out.push('[');
        for (i, element) in vector.iter().enumerate() {
            if self.budget == 0 {
                break;
            }
            if i > 0 {
                self.out.push(',');
            }
            match element {
                Ok(element) => self.value(&element, depth + 1),
                Err(_) => self.out.push_str("null"),
            }
        }
        self.out.push(']');
    }
}

fn push_display(out: &mut String, value: impl std::fmt::Display) {
    let _ = write!(out, "{value}");
}

fn write_float(out: &mut String, f: f64) {
    if !f.is_finite() {
        out.push_str("null");
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        let _ = write!(out, "{f:.1}");
    } else {
        push_display(out, f);
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if c < ' ' => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use crate::builder::FlexBuilder;
    use crate::reader::Reference;
    use pretty_assertions::assert_eq;

    fn json(build: impl FnOnce(&mut FlexBuilder)) -> String {
        let mut b = FlexBuilder::new();
        build(&mut b);
        Reference::root(b.finish()).unwrap().to_json()
    }

    #[test]
    fn test_scalars() {
        assert_eq!(json(|b| b.null()), "null");
        assert_eq!(json(|b| b.bool(false)), "false");
        assert_eq!(json(|b| b.int(-42)), "-42");
        assert_eq!(json(|b| b.uint(u64::MAX)), "18446744073709551615");
        assert_eq!(json(|b| b.float(4.0)), "4.0");
        assert_eq!(json(|b| b.float(0.1)), "0.1");
        assert_eq!(json(|b| b.double(-1.5)), "-1.5");
        assert_eq!(json(|b| b.float(1e20)), "100000000000000000000");
        assert_eq!(json(|b| b.float(f64::NAN)), "null");
        assert_eq!(json(|b| b.float(f64::INFINITY)), "null");
        assert_eq!(json(|b| b.indirect_int(7)), "7");
    }

    #[test]
    fn test_string_escaping() {
        let rendered = json(|b| b.string("say \"hi\"\\\n\t\u{1}é"));
        assert_eq!(rendered, r#""say \"hi\"\\\n\t\u0001é""#);
        assert_eq!(json(|b| b.blob(b"ab\"")), r#""ab\"""#);
        assert_eq!(json(|b| b.key("k")), r#""k""#);
    }

    #[test]
    fn test_containers() {
        let rendered = json(|b| {
            b.map(|m| {
                m.key("b");
                m.vector(|v| {
                    v.int(1);
                    v.string("two");
                    v.null();
                    v.typed_vector_from(&[true, false]);
                });
                m.key("a");
                m.map(|_| {});
                m.key("c");
                m.vector(|_| {});
            })
        });
        assert_eq!(rendered, r#"{"a":{},"b":[1,"two",null,[true,false]],"c":[]}"#);
    }

    #[test]
    fn test_display_matches_to_json() {
        let mut b = FlexBuilder::new();
        b.vector_from_elements(&["x".into(), 2.5f64.into(), None::<i32>.into()]);
        let data = b.finish();
        let root = Reference::root(data).unwrap();
        assert_eq!(root.to_string(), r#"["x",2.5,null]"#);
        assert_eq!(root.to_string(), root.to_json());
    }

    #[test]
    fn test_self_referencing_vector_is_cut_off() {
        // A one element vector whose element is an offset back to the vector
        // itself: data at 1, slot at 1 pointing 0 bytes back
        let data = [1, 0, 40, 2, 40, 1];
        let rendered = Reference::root(&data).unwrap().to_json();
        assert!(rendered.starts_with("[[[["));
        assert!(rendered.ends_with("]]]]"));
        assert_eq!(rendered.matches('[').count(), rendered.matches(']').count());
    }

    #[test]
    fn test_vector_containing_itself_twice_terminates() {
        // Two slots at 1 and 2, both pointing at the vector body at 1
        let data = [2, 0, 1, 40, 40, 4, 40, 1];
        let root = Reference::root(&data).unwrap();
        assert_eq!(root.as_vector().len(), 2);

        let rendered = root.to_json();
        assert!(rendered.len() < 256, "{rendered}");
        assert_eq!(rendered.matches('[').count(), rendered.matches(']').count());
        assert_eq!(root.to_string(), rendered);
    }

    #[test]
    fn test_reused_values_render_in_full() {
        let mut b = FlexBuilder::new();
        b.vector(|v| {
            v.string("shared");
            let shared = v.last_value().unwrap();
            for _ in 0..5 {
                v.reuse_value(shared);
            }
        });
        let rendered = Reference::root(b.finish()).unwrap().to_json();
        assert_eq!(rendered, format!("[{}]", vec![r#""shared""#; 6].join(",")));
    }
}
