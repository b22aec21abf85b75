//! The template finite-state machine: interleaves literal HTML with `<? ?>`-bracketed
//! script fragments, executed against a `Sandbox`.

use crate::sandbox::{is_complete, Sandbox};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Html,
    Script,
}

/// Runs `source` (the full contents of a template file) against `sandbox`, line by line,
/// per the five cases (A–E) of the `<?`/`?>` scan. Literal HTML segments and script output
/// both land in `sandbox`'s response body, in document order, via `emit_html`/`puts`.
/// `path` names the source in `die` messages for invalid block nesting.
pub fn run(path: &str, source: &str, sandbox: &mut Sandbox<'_>) {
    let mut mode = Mode::Html;
    let mut pending = String::new();

    for (line_no, line) in source.lines().enumerate() {
        let line_no = line_no + 1;
        let mut scan = 0usize;

        loop {
            if sandbox.should_terminate() {
                return;
            }

            let b = find_from(line, "<?", scan);
            let e = find_from(line, "?>", scan);

            match (b, e) {
                (None, None) => {
                    // Case A
                    if mode == Mode::Html {
                        sandbox.emit_html(&line[scan..]);
                    } else {
                        pending.push_str(&line[scan..]);
                        pending.push('\n');
                        if is_complete(&pending) {
                            sandbox.run_fragment(&pending);
                            pending.clear();
                        }
                    }
                    break;
                }
                (Some(b), None) => {
                    // Case B
                    if mode != Mode::Html {
                        die_invalid(sandbox, path, line_no);
                        return;
                    }
                    sandbox.emit_html(&line[scan..b]);
                    pending.push_str(&line[b + 2..]);
                    pending.push('\n');
                    mode = Mode::Script;
                    break;
                }
                (None, Some(e)) => {
                    // Case C
                    if mode != Mode::Script {
                        die_invalid(sandbox, path, line_no);
                        return;
                    }
                    pending.push_str(&line[scan..e]);
                    sandbox.run_fragment(&pending);
                    pending.clear();
                    mode = Mode::Html;
                    sandbox.emit_html(&line[e + 2..]);
                    break;
                }
                (Some(b), Some(e)) if b < e => {
                    // Case D
                    if mode != Mode::Html {
                        die_invalid(sandbox, path, line_no);
                        return;
                    }
                    sandbox.emit_html(&line[scan..b]);
                    sandbox.run_fragment(&line[b + 2..e]);
                    scan = e + 2;
                }
                (Some(b), Some(e)) => {
                    // Case E (e < b, since b == e is impossible: "<?" and "?>" can't start
                    // at the same offset)
                    if mode != Mode::Script {
                        die_invalid(sandbox, path, line_no);
                        return;
                    }
                    pending.push_str(&line[scan..e]);
                    sandbox.run_fragment(&pending);
                    pending.clear();
                    sandbox.emit_html(&line[e + 2..b]);
                    mode = Mode::Script;
                    scan = b + 2;
                }
            }
        }

        if sandbox.should_terminate() {
            return;
        }
        if mode == Mode::Html {
            sandbox.emit_html("\n");
        }
    }
}

fn find_from(line: &str, needle: &str, scan: usize) -> Option<usize> {
    if scan > line.len() {
        return None;
    }
    line[scan..].find(needle).map(|i| i + scan)
}

fn die_invalid(sandbox: &mut Sandbox<'_>, path: &str, line_no: usize) {
    sandbox.run_fragment(&format!("die(\"{}:{} -- invalid script block\")", path, line_no));
}
