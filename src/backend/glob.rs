//! Redis-style glob matching used by the memory backend's KEYS.
//!
//! Supports `*`, `?`, `[abc]`, `[^a]` / `[!a]`, `[a-z]` and `\` escapes.

/// Returns true when `text` matches `pattern`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    match_from(&p, &t)
}

fn match_from(p: &[char], t: &[char]) -> bool {
    let (mut pi, mut ti) = (0, 0);
    // Backtrack point for the most recent `*`
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(p, pi, t[ti]) {
                        if matched {
                            pi = next;
                            ti += 1;
                            continue;
                        }
                    } else if t[ti] == '[' {
                        // Unterminated class is a literal '['
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c => {
                    if c == t[ti] {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
            }
        }

        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

/// Matches `c` against the class starting at `p[start] == '['`.
/// Returns `(matched, index after ']')`, or `None` if the class never closes.
fn match_class(p: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = i < p.len() && (p[i] == '^' || p[i] == '!');
    if negate {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    while i < p.len() {
        if p[i] == ']' && !first {
            return Some((matched != negate, i + 1));
        }
        first = false;

        let lo = if p[i] == '\\' && i + 1 < p.len() {
            i += 1;
            p[i]
        } else {
            p[i]
        };

        if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' {
            let hi = p[i + 2];
            if lo <= c && c <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if lo == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        assert!(glob_match("team:7", "team:7"));
        assert!(!glob_match("team:7", "team:70"));
    }

    #[test]
    fn test_star() {
        assert!(glob_match("player:*:7*", "player:team:7"));
        assert!(glob_match("player:*:7*", "player:team:7:summary"));
        assert!(glob_match("player:*:7*", "player:team:70"));
        assert!(!glob_match("player:*:7*", "player:team:8"));
        assert!(!glob_match("player:*:7*", "standing:team:7"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
    }

    #[test]
    fn test_question_mark() {
        assert!(glob_match("team:?", "team:7"));
        assert!(!glob_match("team:?", "team:77"));
    }

    #[test]
    fn test_classes() {
        assert!(glob_match("team:[0-9]", "team:4"));
        assert!(!glob_match("team:[0-9]", "team:x"));
        assert!(glob_match("team:[^0-9]", "team:x"));
        assert!(glob_match("team:[abc]", "team:b"));
        assert!(!glob_match("team:[!abc]", "team:b"));
    }

    #[test]
    fn test_escape() {
        assert!(glob_match("team:\\*", "team:*"));
        assert!(!glob_match("team:\\*", "team:7"));
    }
}
