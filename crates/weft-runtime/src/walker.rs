#![forbid(unsafe_code)]

//! Walk strings.
//!
//! A walk string is a compact instruction sequence, one printable ASCII
//! character per code, that navigates a freshly cloned template and binds the
//! nodes dynamic code needs, in order, into the scope.
//!
//! | chars        | code              | effect                                      |
//! |--------------|-------------------|---------------------------------------------|
//! | `' '`        | Get               | bind the current node                       |
//! | `'!'`        | Before            | insert an empty text marker before, bind it |
//! | `'#'`        | After             | insert an empty text marker after, bind it  |
//! | `'%'`        | Replace           | replace (and free) the current node         |
//! | `'C'..='Z'`  | Next(0..24)       | advance in document order                   |
//! | `'a'..='j'`  | Over(0..10)       | advance to the next sibling                 |
//! | `'k'..='t'`  | Out(0..10)        | go to the parent n times, then next sibling |
//! | `'u'..='~'`  | Multiplier digit  | scale the following count                   |
//!
//! Counts larger than a range are written as base-10 multiplier digits
//! followed by the remainder code: `count = multiplier * range + remainder`.
//!
//! Everything after the last binding code is navigation that binds nothing,
//! so compiled walk strings are trimmed with [`trim_walk_string`].

use smallvec::SmallVec;

use crate::dom::{Document, NodeRef};
use crate::error::{Result, RuntimeError};
use crate::scope::Scope;

const GET: u8 = b' ';
const BEFORE: u8 = b'!';
const AFTER: u8 = b'#';
const REPLACE: u8 = b'%';
/// Codes above this one carry no binding.
const LAST_BINDING: u8 = b'/';
const NEXT: u8 = b'C';
const NEXT_END: u8 = b'[';
const OVER: u8 = b'a';
const OUT: u8 = b'k';
const MULTIPLIER: u8 = b'u';
const MULTIPLIER_END: u8 = 127;

const NEXT_RANGE: usize = (NEXT_END - NEXT) as usize;
const OVER_RANGE: usize = (OUT - OVER) as usize;
const OUT_RANGE: usize = (MULTIPLIER - OUT) as usize;
const MULTIPLIER_RANGE: usize = (MULTIPLIER_END - MULTIPLIER) as usize;

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkCode {
    Get,
    Before,
    After,
    Replace,
    Next(usize),
    Over(usize),
    Out(usize),
}

impl WalkCode {
    /// Whether the code binds a node into the scope.
    #[must_use]
    pub const fn binds(self) -> bool {
        matches!(self, Self::Get | Self::Before | Self::After | Self::Replace)
    }
}

/// Decode a walk string.
///
/// # Errors
///
/// [`RuntimeError::InvalidWalkCode`] for characters outside the table and
/// for counts that overflow.
pub fn decode(walks: &str) -> Result<SmallVec<[WalkCode; 16]>> {
    let mut codes = SmallVec::new();
    let mut multiplier = 0usize;
    for (position, ch) in walks.char_indices() {
        let invalid = RuntimeError::InvalidWalkCode { code: ch, position };
        let Ok(byte) = u8::try_from(ch) else {
            return Err(invalid);
        };
        let scale = move |range: usize, base: u8| {
            multiplier
                .checked_mul(range)
                .and_then(|scaled| scaled.checked_add(usize::from(byte - base)))
        };
        let code = match byte {
            GET => Some(WalkCode::Get),
            BEFORE => Some(WalkCode::Before),
            AFTER => Some(WalkCode::After),
            REPLACE => Some(WalkCode::Replace),
            NEXT..NEXT_END => scale(NEXT_RANGE, NEXT).map(WalkCode::Next),
            OVER..OUT => scale(OVER_RANGE, OVER).map(WalkCode::Over),
            OUT..MULTIPLIER => scale(OUT_RANGE, OUT).map(WalkCode::Out),
            MULTIPLIER..MULTIPLIER_END => {
                multiplier = scale(MULTIPLIER_RANGE, MULTIPLIER).ok_or(invalid)?;
                continue;
            }
            _ => None,
        };
        codes.push(code.ok_or(invalid)?);
        multiplier = 0;
    }
    Ok(codes)
}

/// Encode codes into their canonical walk string.
#[must_use]
pub fn encode(codes: &[WalkCode]) -> String {
    let mut out = String::new();
    for code in codes {
        match *code {
            WalkCode::Get => out.push(char::from(GET)),
            WalkCode::Before => out.push(char::from(BEFORE)),
            WalkCode::After => out.push(char::from(AFTER)),
            WalkCode::Replace => out.push(char::from(REPLACE)),
            WalkCode::Next(count) => push_count(&mut out, NEXT, NEXT_RANGE, count),
            WalkCode::Over(count) => push_count(&mut out, OVER, OVER_RANGE, count),
            WalkCode::Out(count) => push_count(&mut out, OUT, OUT_RANGE, count),
        }
    }
    out
}

fn push_count(out: &mut String, base: u8, range: usize, count: usize) {
    let mut digits: SmallVec<[u8; 4]> = SmallVec::new();
    let mut multiplier = count / range;
    while multiplier > 0 {
        digits.push(MULTIPLIER + (multiplier % MULTIPLIER_RANGE) as u8);
        multiplier /= MULTIPLIER_RANGE;
    }
    out.extend(digits.iter().rev().map(|digit| char::from(*digit)));
    out.push(char::from(base + (count % range) as u8));
}

/// Strip trailing navigation: nothing after the last binding code is needed.
#[must_use]
pub fn trim_walk_string(walks: &str) -> &str {
    let end = walks
        .bytes()
        .rposition(|byte| byte <= LAST_BINDING)
        .map_or(0, |index| index + 1);
    &walks[..end]
}

/// Whether the walk inserts siblings around the root node, which then has to
/// live in a fragment.
#[must_use]
pub fn needs_fragment(walks: &str) -> bool {
    for byte in walks.bytes() {
        match byte {
            BEFORE | AFTER | REPLACE => return true,
            GET => {}
            _ => return false,
        }
    }
    false
}

/// Run `walks` starting at `start`, never leaving `root`, binding nodes into
/// `scope` in order.
///
/// # Errors
///
/// Fails on undecodable codes, and when an instruction needs a node where
/// the walk has run off the tree or a marker would need a parent the node
/// does not have.
pub fn walk(
    doc: &mut Document,
    root: NodeRef,
    start: Option<NodeRef>,
    walks: &str,
    scope: &mut Scope,
) -> Result<()> {
    let mut current = start;
    for (position, code) in decode(walks)?.into_iter().enumerate() {
        let out_of_bounds = RuntimeError::WalkOutOfBounds { position };
        let node = current.ok_or_else(|| out_of_bounds.clone())?;
        match code {
            WalkCode::Get => {
                scope.bind_node(node);
            }
            WalkCode::Before | WalkCode::After | WalkCode::Replace => {
                let marker = doc.create_text("");
                let placed = match code {
                    WalkCode::Before => doc.insert_sibling_before(node, marker),
                    WalkCode::After => doc.insert_sibling_after(node, marker),
                    _ => doc.replace(node, marker),
                };
                if !placed {
                    return Err(out_of_bounds);
                }
                if code == WalkCode::Replace {
                    // A replaced node nothing has bound is unreachable.
                    if !scope.nodes().contains(&node) {
                        doc.release(node);
                    }
                    current = Some(marker);
                }
                scope.bind_node(marker);
            }
            WalkCode::Next(count) => {
                current = advance(node, count, |n| doc.next_in_order(n, root));
            }
            WalkCode::Over(count) => {
                current = advance(node, count, |n| doc.next_sibling(n));
            }
            WalkCode::Out(count) => {
                let mut up = node;
                for _ in 0..count {
                    match doc.parent(up) {
                        Some(parent) if up != root => up = parent,
                        _ => break,
                    }
                }
                current = if up == root { None } else { doc.next_sibling(up) };
            }
        }
    }
    Ok(())
}

fn advance(node: NodeRef, count: usize, step: impl Fn(NodeRef) -> Option<NodeRef>) -> Option<NodeRef> {
    (0..count).try_fold(node, |current, _| step(current))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_the_counter_walk() {
        let codes = decode(" D l").expect("decodes");
        assert_eq!(
            codes.as_slice(),
            &[WalkCode::Get, WalkCode::Next(1), WalkCode::Get, WalkCode::Out(1)]
        );
        assert_eq!(encode(&codes), " D l");
    }

    #[test]
    fn multiplier_digits_scale_counts() {
        let codes = [WalkCode::Next(100), WalkCode::Over(10), WalkCode::Out(9)];
        let encoded = encode(&codes);
        assert_eq!(encoded, "yGvat");
        assert_eq!(decode(&encoded).expect("decodes").as_slice(), &codes);
    }

    #[test]
    fn rejects_unknown_codes() {
        assert_eq!(
            decode(" \"").expect_err("quote is not a code"),
            RuntimeError::InvalidWalkCode { code: '"', position: 1 }
        );
        assert!(decode("é").is_err());
        let overflowing = format!("{}C", "~".repeat(25));
        assert!(matches!(
            decode(&overflowing),
            Err(RuntimeError::InvalidWalkCode { code: '~', .. })
        ));
    }

    #[test]
    fn trimming_drops_trailing_navigation() {
        assert_eq!(trim_walk_string(" D l"), " D ");
        assert_eq!(trim_walk_string("Db"), "");
        assert_eq!(trim_walk_string("%"), "%");
        assert_eq!(trim_walk_string(""), "");
    }

    #[test]
    fn root_insertions_need_a_fragment() {
        assert!(needs_fragment("!"));
        assert!(needs_fragment(" %"));
        assert!(!needs_fragment(" D!"));
        assert!(!needs_fragment(" "));
    }

    #[test]
    fn walk_binds_and_inserts_markers() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        let a = doc.create_element("a");
        let b = doc.create_element("b");
        doc.append_child(div, a);
        doc.append_child(div, b);

        let mut scope = Scope::new(0);
        // get div, next -> a, get a, marker after a, over the marker to b, replace b
        walk(&mut doc, div, Some(div), " D #c%", &mut scope).expect("walks");
        assert_eq!(scope.nodes().len(), 4);
        assert_eq!(scope.nodes()[0], div);
        assert_eq!(scope.nodes()[1], a);
        assert_eq!(doc.to_markup(div), "<div><a></a></div>");
        assert_eq!(doc.children(div).count(), 3);
        assert!(!doc.contains(b));
    }

    #[test]
    fn walking_off_the_tree_is_an_error() {
        let mut doc = Document::new();
        let only = doc.create_element("p");
        let mut scope = Scope::new(0);
        let err = walk(&mut doc, only, Some(only), "D ", &mut scope).expect_err("no child");
        assert_eq!(err, RuntimeError::WalkOutOfBounds { position: 1 });
        let err = walk(&mut doc, only, Some(only), "!", &mut scope).expect_err("no parent");
        assert_eq!(err, RuntimeError::WalkOutOfBounds { position: 0 });
    }
}
