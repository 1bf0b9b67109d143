use rand::Rng;
use subtle::ConstantTimeEq;

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

/// Draws a six-digit code uniformly from 100000..=999999.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    rng.gen_range(CODE_MIN..=CODE_MAX).to_string()
}

/// Draws a code that differs from every code in `taken`.
pub fn generate_code_excluding(taken: &[&str]) -> String {
    loop {
        let code = generate_code();
        if !taken.iter().any(|t| *t == code) {
            return code;
        }
    }
}

/// Compares a stored code with a submitted one without leaking the
/// position of the first mismatch through timing.
pub fn codes_match(expected: &str, submitted: &str) -> bool {
    let submitted = submitted.trim();
    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}
