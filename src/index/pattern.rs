//! 模糊订阅表达式
//!
//! 表达式格式：`namespace>>groupPattern>>servicePattern`，分组与服务名片段中
//! `*` 可以出现在任意位置并匹配任意长度的字符。命名空间片段为空时视为默认
//! 命名空间，命名空间本身不支持通配。
//!
//! 新服务筛选匹配表达式与新表达式筛选匹配服务这两个方向共用
//! [`FuzzyPattern::matches`]，保证两侧索引不会产生偏差。

use std::fmt;

use crate::types::Service;
use crate::utils::DEFAULT_NAMESPACE;

/// 片段分隔符
pub const FUZZY_SEPARATOR: &str = ">>";
/// 通配符
pub const WILDCARD: char = '*';

/// 解析后的模糊订阅表达式
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuzzyPattern {
    namespace: String,
    group: String,
    service: String,
}

impl FuzzyPattern {
    /// 解析表达式，格式非法时返回 None
    pub fn parse(pattern: &str) -> Option<Self> {
        let mut parts = pattern.split(FUZZY_SEPARATOR);
        let namespace = parts.next()?;
        let group = parts.next()?;
        let service = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        if group.is_empty() || service.is_empty() || namespace.contains(WILDCARD) {
            return None;
        }
        let namespace = if namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            namespace
        };
        Some(Self {
            namespace: namespace.to_string(),
            group: group.to_string(),
            service: service.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn group_pattern(&self) -> &str {
        &self.group
    }

    pub fn service_pattern(&self) -> &str {
        &self.service
    }

    /// 依次比较命名空间、分组、服务名
    pub fn matches(&self, namespace: &str, group: &str, name: &str) -> bool {
        self.namespace == namespace && glob_match(&self.group, group) && glob_match(&self.service, name)
    }

    pub fn matches_service(&self, service: &Service) -> bool {
        self.matches(service.namespace(), service.group(), service.name())
    }
}

impl fmt::Display for FuzzyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FUZZY_SEPARATOR}{}{FUZZY_SEPARATOR}{}",
            self.namespace, self.group, self.service
        )
    }
}

/// 拼接表达式
pub fn build_pattern(namespace: &str, group_pattern: &str, service_pattern: &str) -> String {
    format!("{namespace}{FUZZY_SEPARATOR}{group_pattern}{FUZZY_SEPARATOR}{service_pattern}")
}

/// 从表达式中取出命名空间，格式非法时返回 None
pub fn namespace_of(pattern: &str) -> Option<String> {
    FuzzyPattern::parse(pattern).map(|p| p.namespace)
}

/// 表达式的规范写法（空命名空间补为默认命名空间），非法表达式原样返回
pub fn canonical_pattern(pattern: &str) -> String {
    FuzzyPattern::parse(pattern).map_or_else(|| pattern.to_string(), |p| p.to_string())
}

/// 按字符串表达式判断服务是否匹配；表达式非法时不匹配任何服务
pub fn matches_pattern(pattern: &str, service: &Service) -> bool {
    FuzzyPattern::parse(pattern).is_some_and(|p| p.matches_service(service))
}

/// `*` 通配匹配，贪心 + 回溯到最近一个 `*`
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && p[pi] == WILDCARD {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == WILDCARD {
        pi += 1;
    }
    pi == p.len()
}

