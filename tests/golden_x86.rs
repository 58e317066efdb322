use minic::compile_to_x86;

/// Compiles `testdata/<base>.c` and compares the emitted assembly
/// byte-for-byte against `testdata/<base>.s`.
fn check_golden(base: &str) {
    let src_path = format!("testdata/{}.c", base);
    let asm_path = format!("testdata/{}.s", base);
    let src = std::fs::read(&src_path).expect("read .c");
    let expected = std::fs::read_to_string(&asm_path).expect("read .s");
    let got = compile_to_x86(&src).expect("compile");
    if got != expected {
        panic!("{}", format_diff(&expected, &got));
    }
}

fn format_diff(expected: &str, got: &str) -> String {
    let mut out = String::new();
    out.push_str("golden mismatch\n");
    let expected_lines: Vec<_> = expected.lines().collect();
    let got_lines: Vec<_> = got.lines().collect();
    let n = expected_lines.len().max(got_lines.len());
    for i in 0..n {
        let want = expected_lines.get(i).copied().unwrap_or("<missing>");
        let have = got_lines.get(i).copied().unwrap_or("<missing>");
        if want != have {
            out.push_str(&format!(
                "  line {}: expected {:?}, got {:?}\n",
                i + 1,
                want,
                have
            ));
        }
    }
    out
}

#[test]
fn golden_return() {
    check_golden("return");
}

#[test]
fn golden_unary() {
    check_golden("unary");
}

#[test]
fn golden_logical() {
    check_golden("logical");
}

#[test]
fn golden_variables() {
    check_golden("variables");
}

#[test]
fn golden_conditional() {
    check_golden("conditional");
}

#[test]
fn golden_loops() {
    check_golden("loops");
}

#[test]
fn golden_functions() {
    check_golden("functions");
}
