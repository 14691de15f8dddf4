//! 通用工具函数

use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+").expect("static pattern compiles"))
}

/// 提取患者名中的第一个数字
pub fn patient_number(name: &str) -> Option<u64> {
    number_pattern()
        .find(name)
        .and_then(|m| m.as_str().parse().ok())
}

/// 患者名的自然排序比较
///
/// 两者都含数字时按第一个数字比较；只有一方含数字时该方在前；都不含时按字母序。
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    match (patient_number(a), patient_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// 按自然顺序排列患者名 (稳定排序)
pub fn natural_order<'a, I>(names: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names: Vec<&str> = names.into_iter().collect();
    names.sort_by(|a, b| natural_cmp(a, b));
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_number() {
        assert_eq!(patient_number("patient_12_b7"), Some(12));
        assert_eq!(patient_number("anon"), None);
    }

    #[test]
    fn test_natural_order() {
        let ordered = natural_order(["p10", "zeta", "p2", "alpha", "p1"]);
        assert_eq!(ordered, vec!["p1", "p2", "p10", "alpha", "zeta"]);
    }

    #[test]
    fn test_natural_order_is_stable_for_equal_numbers() {
        let ordered = natural_order(["b3", "a3", "c1"]);
        assert_eq!(ordered, vec!["c1", "b3", "a3"]);
    }
}
