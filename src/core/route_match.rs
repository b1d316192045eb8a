//! Pure path-pattern matching over route tables.
//!
//! Both public-path patterns and private route rules share one grammar:
//! slash-separated segments, where a segment beginning with `:` or `{`
//! matches any single non-empty request segment and every other segment
//! matches literally. Matching is scored so that literal segments outrank
//! wildcards, and ties fall to the pattern with more segments. No I/O, no
//! state — everything here is deterministic and order-independent.
use crate::config::models::RouteRule;

fn segments(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').collect()
}

fn is_root(segs: &[&str]) -> bool {
    segs.len() == 1 && segs[0].is_empty()
}

/// Match a single pattern against a request path.
///
/// `"/"` and `""` both denote the root and match each other. Segment counts
/// must be equal; wildcard segments reject empty request segments.
pub fn match_pattern(pattern: &str, path: &str) -> bool {
    let pattern_segs = segments(pattern);
    let path_segs = segments(path);

    if is_root(&pattern_segs) && is_root(&path_segs) {
        return true;
    }
    if pattern_segs.len() != path_segs.len() {
        return false;
    }

    pattern_segs.iter().zip(&path_segs).all(|(pat, seg)| {
        if pat.starts_with(':') || pat.starts_with('{') {
            !seg.is_empty()
        } else {
            pat == seg
        }
    })
}

/// Match a private route rule, returning whether it matched and its score.
///
/// A populated method list filters first (case-insensitive); an empty list
/// matches any method. Each literal segment scores 2, each wildcard 1, and a
/// root-vs-root match scores 1, so literal patterns always outrank wildcard
/// ones of the same length.
pub fn match_rule(rule: &RouteRule, path: &str, method: &str) -> (bool, u32) {
    if !rule.methods.is_empty()
        && !rule.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    {
        return (false, 0);
    }

    let rule_segs = segments(&rule.path);
    let path_segs = segments(path);

    if is_root(&rule_segs) && is_root(&path_segs) {
        return (true, 1);
    }
    if rule_segs.len() != path_segs.len() {
        return (false, 0);
    }

    let mut score = 0;
    for (pat, seg) in rule_segs.iter().zip(&path_segs) {
        if pat.starts_with(':') || pat.starts_with('{') {
            if seg.is_empty() {
                return (false, 0);
            }
            score += 1;
        } else if pat == seg {
            score += 2;
        } else {
            return (false, 0);
        }
    }

    (true, score)
}

/// Pick the best-matching rule for a request, if any.
///
/// Highest score wins; equal scores fall to the rule with more path
/// segments. Insertion order never decides, so shuffling the rule list
/// cannot change the winner.
pub fn best_match<'a>(rules: &'a [RouteRule], path: &str, method: &str) -> Option<&'a RouteRule> {
    let mut best: Option<&RouteRule> = None;
    let mut best_score = 0;
    let mut best_len = 0;

    for rule in rules {
        let (matched, score) = match_rule(rule, path, method);
        if !matched {
            continue;
        }
        let len = segments(&rule.path).len();
        if best.is_none() || score > best_score || (score == best_score && len > best_len) {
            best = Some(rule);
            best_score = score;
            best_len = len;
        }
    }

    best
}
