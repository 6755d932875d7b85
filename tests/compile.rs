use std::collections::HashMap;

use riscii::{
    c::{compile, Options, Output},
    diag::Severity,
};

/// Just enough of the processor to run compiled programs: separate code and data memories,
/// with the data memory shared by globals and the stack.
struct Machine<'a> {
    code: &'a [u16],
    data: HashMap<u16, u16>,
    regs: [u16; 8],
    flags: u16,
    pc: u16,
}

fn sext(v: u16, bits: u32) -> u16 {
    let shift = 16 - bits;
    (((v << shift) as i16) >> shift) as u16
}

impl<'a> Machine<'a> {
    fn new(code: &'a [u16]) -> Self {
        Self {
            code,
            data: HashMap::new(),
            regs: [0; 8],
            flags: 0,
            pc: 0,
        }
    }

    /// Runs until `HLT`, returning `$ac`.
    fn run(&mut self, max_steps: usize) -> Option<u16> {
        for _ in 0..max_steps {
            let w = *self.code.get(self.pc as usize / 2)?;
            let next = self.pc.wrapping_add(2);
            self.pc = next;
            let op = w >> 12;
            let r1 = ((w >> 9) & 7) as usize;
            let r2 = ((w >> 6) & 7) as usize;
            let off6 = sext(w & 0x3F, 6);
            match op {
                0 => return Some(self.regs[6]),
                1 => {}
                2 => {
                    self.regs[7] = next;
                    self.pc = next.wrapping_add(sext(w & 0x1FF, 9));
                }
                3 => {
                    if (w >> 9) & 7 & self.flags != 0 {
                        self.pc = next.wrapping_add(sext(w & 0x1FF, 9));
                    }
                }
                4 => {
                    let addr = self.regs[r2].wrapping_add(off6);
                    self.regs[r1] = self.data.get(&addr).copied().unwrap_or(0);
                }
                5 => self.pc = self.regs[r2].wrapping_add(off6),
                6 => {
                    let target = self.regs[r2].wrapping_add(off6);
                    self.regs[r1] = next;
                    self.pc = target;
                }
                7 => {
                    let addr = self.regs[r2].wrapping_add(off6);
                    self.data.insert(addr, self.regs[r1]);
                }
                10 => {
                    self.regs[r1] = if w & 0x100 != 0 {
                        (self.regs[r1] << 8) | (w & 0xFF)
                    } else {
                        sext(w & 0xFF, 8)
                    };
                }
                _ => {
                    let b = self.regs[r2];
                    let is_shift = op == 12 || op == 13;
                    let c = if w & 0x20 == 0 {
                        self.regs[(w & 7) as usize]
                    } else if is_shift {
                        w & 0xF
                    } else {
                        sext(w & 0x1F, 5)
                    };
                    let arith = w & 0x10 != 0;
                    let res = match op {
                        8 => b.wrapping_add(c),
                        9 => b.wrapping_sub(c),
                        11 => b ^ c,
                        12 => b.checked_shl(c as u32).unwrap_or(0),
                        13 if arith => ((b as i16) >> c.min(15)) as u16,
                        13 => b.checked_shr(c as u32).unwrap_or(0),
                        14 => b | c,
                        15 => b & c,
                        _ => unreachable!("opcode {op}"),
                    };
                    self.regs[r1] = res;
                    self.flags = if res == 0 {
                        0b010
                    } else if (res as i16) < 0 {
                        0b100
                    } else {
                        0b001
                    };
                }
            }
        }
        None
    }
}

fn build(src: &str, optimize: bool) -> Output {
    let opts = Options {
        optimize,
        ..Default::default()
    };
    match compile(src, opts) {
        Ok(out) => out,
        Err(e) => panic!("compilation failed: {e:#}"),
    }
}

/// Compiles and runs `src` both plain and optimized, checking that both agree.
fn eval(src: &str) -> i16 {
    let plain = build(src, false);
    let result = Machine::new(&plain.words).run(1_000_000).expect("program did not halt");
    let opt = build(src, true);
    let opt_result = Machine::new(&opt.words).run(1_000_000).expect("program did not halt");
    assert_eq!(result, opt_result, "optimized program disagrees");
    result as i16
}

#[test]
fn test_gcd() {
    let src = "
int gcd(int a, int b) {
    while (a != b) {
        if (a > b) { a = a - b; }
        if (b > a) { b = b - a; }
    }
    return a;
}

int main() {
    return gcd(84, 36);
}
";
    assert_eq!(eval(src), 12);
}

#[test]
fn test_recursion_and_globals() {
    let src = "
int calls;

int fib(int n) {
    calls = calls + 1;
    if (n < 2) { return n; }
    return fib(n - 1) + fib(n - 2);
}

int main() {
    calls = 0;
    return fib(10) + calls;
}
";
    assert_eq!(eval(src), 55 + 177);
}

#[test]
fn test_loop_with_block_locals() {
    let src = "
int main() {
    int i;
    int sum;
    i = 0;
    sum = 0;
    while (i < 10) {
        int twice;
        twice = i + i;
        sum = sum + twice;
        i = i + 1;
    }
    return sum;
}
";
    assert_eq!(eval(src), 90);
}

#[test]
fn test_call_statement_and_nested_calls() {
    let src = "
int counter;

int bump(int by) {
    counter = counter + by;
    return counter;
}

int add3(int a, int b, int c) {
    return a + b + c;
}

int main() {
    counter = 100;
    bump(5);
    bump(-2);
    return add3(bump(1), (1 + 2) ^ 1, add3(1, 2, 3));
}
";
    assert_eq!(eval(src), 104 + 2 + 6);
}

#[test]
fn test_operators() {
    let src = "
int main() {
    unsigned int u;
    int s;
    int one;
    char c;
    u = 0xF000;
    s = -4096;
    one = 1;
    c = 'a';
    return (u >> 12) + (s >> 12) + (~one & 5) + !one + (s < one) + (one <= 1)
        + (c == 97) + (one << 4) - (one | 6);
}
";
    assert_eq!(eval(src), 15 - 1 + 4 + 0 + 1 + 1 + 1 + 16 - 7);
}

#[test]
fn test_comparisons_across_sign_bit() {
    let src = "
int lt(int a, int b) {
    return a < b;
}

int ugt(unsigned int a, unsigned int b) {
    return a > b;
}

int main() {
    int a;
    int b;
    unsigned int u;
    a = -30000;
    b = 10000;
    u = 0xF000;
    return (a < b) + ((u > 1) << 1) + (lt(b, a) << 2) + ((u >= 0x8000) << 3)
        + (ugt(u, 1) << 4) + ((a >= b) << 5) + ((b > a) << 6);
}
";
    assert_eq!(eval(src), 1 + 2 + 8 + 16 + 64);
}

#[test]
fn test_runtime_comparison_matches_folding() {
    let folded = "int main() { return (-30000 < 10000) + ((0xF000 > 1) << 1); }";
    let runtime = "int main() {
    int a;
    unsigned int u;
    a = -30000;
    u = 0xF000;
    return (a < 10000) + ((u > 1) << 1);
}";
    assert_eq!(eval(folded), 3);
    assert_eq!(eval(runtime), 3);
}

#[test]
fn test_constant_branches() {
    let src = "
int main() {
    int x;
    x = 3;
    if (0) { x = 100; }
    if (1) { x = x + 1; }
    while (0) { x = 200; }
    return x;
}
";
    assert_eq!(eval(src), 4);

    let plain = build(src, false);
    let opt = build(src, true);
    assert!(opt.words.len() < plain.words.len());
    let notes: Vec<_> = opt
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Info)
        .map(|d| d.to_string())
        .collect();
    assert_eq!(
        notes,
        vec![
            "(Line 5) OPT- dropping if with a zero condition".to_owned(),
            "(Line 7) OPT- dropping while with a zero condition".to_owned(),
        ]
    );
}

#[test]
fn test_large_frame() {
    let decls: String = (0..20).map(|i| format!("    int v{i};\n")).collect();
    let src = format!(
        "int main() {{\n{decls}    v0 = 5;\n    v19 = 300;\n    v18 = v19 - v0;\n    return v18 + v0;\n}}\n"
    );
    assert_eq!(eval(&src), 300);
}

#[test]
fn test_warnings_escalate() {
    let src = "int main() { int unused; return 0; }";
    let out = compile(src, Options::default()).unwrap();
    let warns: Vec<_> = out
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warn)
        .map(|d| d.to_string())
        .collect();
    assert_eq!(warns, vec!["(Line 1) \"unused\" is unused".to_owned()]);

    let strict = Options {
        werror: true,
        ..Default::default()
    };
    let err = compile(src, strict).unwrap_err();
    assert!(format!("{err:#}").contains("(warnings are errors)"));
}

#[test]
fn test_fatal_errors() {
    let err = compile("int main() { return y; }", Options::default()).unwrap_err();
    assert!(format!("{err:#}").contains("\"y\" is undeclared"));

    let err = compile("int main() { return 0 }", Options::default()).unwrap_err();
    assert!(format!("{err:#}").contains("(Line 1)"));
}

#[test]
fn test_output_formats() {
    let out = build("int main() { return 7; }", false);
    assert!(out.asm.contains("f_main:"));
    assert!(out.asm.contains("ret_main:"));
    assert!(out.asm.contains("\t_to\tf_main"));

    let lines: Vec<_> = out.hex.lines().collect();
    assert_eq!(lines.len(), 2 * out.words.len());
    assert!(lines
        .iter()
        .all(|l| l.len() == 2 && l.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())));
    assert_eq!(lines[0], format!("{:02x}", out.words[0] >> 8));
    assert_eq!(Machine::new(&out.words).run(1000), Some(7));
}
