//! Porter stemmer, step 1.
//!
//! Step 1 strips plurals and the `-ed` / `-ing` inflections and turns a terminal
//! `y` into `i`. It is the part of the Porter algorithm that does most of the
//! conflation work for short texts such as comic titles and alt text, without
//! the aggressive derivational rewrites of the later steps (`winter` stays
//! `winter`, `relational` stays `relational`).
//!
//! Only ASCII lowercase words are stemmed; anything else (digits, accented
//! letters) is returned unchanged.

/// Stem a single lowercase token.
///
/// # Examples
/// ```
/// use xkcd_words::stem;
///
/// assert_eq!(stem("caresses"), "caress");
/// assert_eq!(stem("hopping"), "hop");
/// assert_eq!(stem("filing"), "file");
/// assert_eq!(stem("happy"), "happi");
/// ```
pub fn stem(word: &str) -> String {
    if word.len() <= 2 || !word.bytes().all(|b| b.is_ascii_lowercase()) {
        return word.to_string();
    }

    let mut w = word.as_bytes().to_vec();
    step_1a(&mut w);
    step_1b(&mut w);
    step_1c(&mut w);

    // Only ASCII bytes were ever written back.
    String::from_utf8(w).unwrap_or_else(|_| word.to_string())
}

fn is_consonant(w: &[u8], i: usize) -> bool {
    match w[i] {
        b'a' | b'e' | b'i' | b'o' | b'u' => false,
        b'y' => i == 0 || !is_consonant(w, i - 1),
        _ => true,
    }
}

/// Number of VC sequences in `w`, the Porter "measure".
fn measure(w: &[u8]) -> usize {
    let mut m = 0;
    let mut i = 0;
    let n = w.len();

    while i < n && is_consonant(w, i) {
        i += 1;
    }
    while i < n {
        while i < n && !is_consonant(w, i) {
            i += 1;
        }
        if i >= n {
            break;
        }
        while i < n && is_consonant(w, i) {
            i += 1;
        }
        m += 1;
    }
    m
}

fn contains_vowel(w: &[u8]) -> bool {
    (0..w.len()).any(|i| !is_consonant(w, i))
}

fn ends_with_double_consonant(w: &[u8]) -> bool {
    let n = w.len();
    n >= 2 && w[n - 1] == w[n - 2] && is_consonant(w, n - 1)
}

/// consonant-vowel-consonant ending where the last consonant is not w, x or y
fn ends_cvc(w: &[u8]) -> bool {
    let n = w.len();
    n >= 3
        && is_consonant(w, n - 3)
        && !is_consonant(w, n - 2)
        && is_consonant(w, n - 1)
        && !matches!(w[n - 1], b'w' | b'x' | b'y')
}

fn replace_suffix(w: &mut Vec<u8>, suffix: &[u8], replacement: &[u8]) {
    w.truncate(w.len() - suffix.len());
    w.extend_from_slice(replacement);
}

fn step_1a(w: &mut Vec<u8>) {
    if w.ends_with(b"sses") {
        replace_suffix(w, b"sses", b"ss");
    } else if w.ends_with(b"ies") {
        replace_suffix(w, b"ies", b"i");
    } else if w.ends_with(b"ss") {
        // unchanged
    } else if w.ends_with(b"s") {
        w.pop();
    }
}

fn step_1b(w: &mut Vec<u8>) {
    if w.ends_with(b"eed") {
        if measure(&w[..w.len() - 3]) > 0 {
            w.pop();
        }
        return;
    }

    let suffix: &[u8] = if w.ends_with(b"ed") {
        b"ed"
    } else if w.ends_with(b"ing") {
        b"ing"
    } else {
        return;
    };

    let stem_len = w.len() - suffix.len();
    if !contains_vowel(&w[..stem_len]) {
        return;
    }
    w.truncate(stem_len);

    if w.ends_with(b"at") || w.ends_with(b"bl") || w.ends_with(b"iz") {
        w.push(b'e');
    } else if ends_with_double_consonant(w) && !matches!(w[w.len() - 1], b'l' | b's' | b'z') {
        w.pop();
    } else if measure(w) == 1 && ends_cvc(w) {
        w.push(b'e');
    }
}

fn step_1c(w: &mut [u8]) {
    let n = w.len();
    if n > 1 && w[n - 1] == b'y' && contains_vowel(&w[..n - 1]) {
        w[n - 1] = b'i';
    }
}
