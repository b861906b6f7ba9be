//! 忽略规则 - 加载、编译、修改、保存
//!
//! 规则文件每行一条：`d: <pattern>` 排除目录，`f: <pattern>` 排除文件。
//! 同类规则合并为一个 `(p1$)|(p2$)|...` 的正则，不区分大小写，锚定在相对路径末尾。
//!
//! 旧文件中的规则以 `\\` 作为路径分隔符，并且以分隔符开头（如 `\\bin\\Debug`）。
//! 读取时把 `\\` 换成 `/`，开头的分隔符换成 `(^|/)`，保存后即为新格式。

use crate::error::{Error, Result};
use regex::{Regex, RegexBuilder, RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// 规则类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Directory,
    File,
}

impl RuleKind {
    /// 规则文件中的行首字符
    pub fn prefix(self) -> char {
        match self {
            RuleKind::Directory => 'd',
            RuleKind::File => 'f',
        }
    }

    fn from_prefix(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'd' => Some(RuleKind::Directory),
            'f' => Some(RuleKind::File),
            _ => None,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Directory => write!(f, "directory"),
            RuleKind::File => write!(f, "file"),
        }
    }
}

/// 单条忽略规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub kind: RuleKind,
    /// 正则片段，或经过转义的字面路径
    pub pattern: String,
}

impl FilterRule {
    pub fn new(kind: RuleKind, pattern: impl Into<String>) -> Self {
        Self {
            kind,
            pattern: pattern.into(),
        }
    }

    /// 以字面量构造规则，路径中的正则元字符会被转义
    pub fn literal(kind: RuleKind, value: &str) -> Self {
        Self::new(kind, regex::escape(&normalize_relative(value)))
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.prefix(), self.pattern)
    }
}

/// 统一路径分隔符为 `/`，去掉开头的分隔符
pub fn normalize_relative(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

/// 依次返回相对路径的所有上级目录，如 `a/b/c.txt` -> `a`, `a/b`
pub fn ancestor_dirs(relative_path: &str) -> impl Iterator<Item = &str> {
    relative_path
        .match_indices('/')
        .map(move |(i, _)| &relative_path[..i])
        .filter(|dir| !dir.is_empty())
}

/// 同类规则编译后的匹配器，没有规则时不匹配任何路径
#[derive(Debug, Default)]
struct Matcher {
    combined: Option<Regex>,
    each: Option<RegexSet>,
    patterns: Vec<String>,
}

impl Matcher {
    fn compile(kind: RuleKind, patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(Self::default());
        }

        let anchored: Vec<String> = patterns.iter().map(|p| format!("({}$)", p)).collect();

        let combined = RegexBuilder::new(&anchored.join("|"))
            .case_insensitive(true)
            .build()
            .map_err(|source| Error::InvalidPattern { kind, source })?;
        let each = RegexSetBuilder::new(&anchored)
            .case_insensitive(true)
            .build()
            .map_err(|source| Error::InvalidPattern { kind, source })?;

        Ok(Self {
            combined: Some(combined),
            each: Some(each),
            patterns: patterns.to_vec(),
        })
    }

    fn is_match(&self, path: &str) -> bool {
        self.combined.as_ref().is_some_and(|re| re.is_match(path))
    }

    fn matching(&self, path: &str) -> Vec<String> {
        match &self.each {
            Some(set) => set
                .matches(path)
                .into_iter()
                .map(|i| self.patterns[i].clone())
                .collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Debug)]
struct CompiledFilters {
    directory: Matcher,
    file: Matcher,
}

/// 编译后的规则快照，只读，可在多个扫描任务间共享
#[derive(Debug, Clone)]
pub struct FilterSnapshot {
    inner: Arc<CompiledFilters>,
}

/// 某个路径命中的规则
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    /// (上级目录, 命中的目录规则)
    pub directory_matches: Vec<(String, String)>,
    /// 命中的文件规则
    pub file_matches: Vec<String>,
}

impl Explanation {
    pub fn is_excluded(&self) -> bool {
        !self.directory_matches.is_empty() || !self.file_matches.is_empty()
    }
}

impl FilterSnapshot {
    fn compile(directory_rules: &[String], file_rules: &[String]) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(CompiledFilters {
                directory: Matcher::compile(RuleKind::Directory, directory_rules)?,
                file: Matcher::compile(RuleKind::File, file_rules)?,
            }),
        })
    }

    /// 不含任何规则的快照
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(CompiledFilters {
                directory: Matcher::default(),
                file: Matcher::default(),
            }),
        }
    }

    /// 直接由规则列表编译
    pub fn from_rules<'a>(rules: impl IntoIterator<Item = &'a FilterRule>) -> Result<Self> {
        let (directory, file) = split_rules(rules);
        Self::compile(&directory, &file)
    }

    pub fn matches_directory(&self, relative_path: &str) -> bool {
        self.inner.directory.is_match(relative_path)
    }

    pub fn matches_file(&self, relative_path: &str) -> bool {
        self.inner.file.is_match(relative_path)
    }

    /// 文件本身或任一上级目录被排除
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        ancestor_dirs(relative_path).any(|dir| self.matches_directory(dir))
            || self.matches_file(relative_path)
    }

    /// 列出命中某个相对路径的所有规则
    pub fn explain(&self, relative_path: &str) -> Explanation {
        let path = normalize_relative(relative_path);

        let directory_matches = ancestor_dirs(&path)
            .flat_map(|dir| {
                self.inner
                    .directory
                    .matching(dir)
                    .into_iter()
                    .map(move |pattern| (dir.to_string(), pattern))
            })
            .collect();

        Explanation {
            directory_matches,
            file_matches: self.inner.file.matching(&path),
        }
    }
}

fn split_rules<'a>(rules: impl IntoIterator<Item = &'a FilterRule>) -> (Vec<String>, Vec<String>) {
    let mut directory = Vec::new();
    let mut file = Vec::new();
    for rule in rules {
        match rule.kind {
            RuleKind::Directory => directory.push(rule.pattern.clone()),
            RuleKind::File => file.push(rule.pattern.clone()),
        }
    }
    (directory, file)
}

/// 解析规则文件内容，`path` 仅用于错误信息
pub fn parse_rules(path: &Path, content: &str) -> Result<Vec<FilterRule>> {
    let mut rules = Vec::new();

    // 旧版本写入的文件以单独的 \r 分行
    let lines = content
        .lines()
        .enumerate()
        .flat_map(|(index, physical)| physical.split('\r').map(move |raw| (index, raw)));

    for (index, raw) in lines {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let parse_error = |message: String| Error::FilterParse {
            path: path.to_path_buf(),
            line: index + 1,
            message,
        };

        let mut chars = line.chars();
        let kind = chars
            .next()
            .and_then(RuleKind::from_prefix)
            .ok_or_else(|| parse_error(format!("未知的规则类型: {}", line)))?;

        let pattern = chars
            .as_str()
            .strip_prefix(':')
            .ok_or_else(|| parse_error(format!("缺少分隔符 ':': {}", line)))?
            .trim();

        if pattern.is_empty() {
            return Err(parse_error("规则内容为空".to_string()));
        }

        let pattern = convert_legacy_separators(pattern);

        // 逐条校验，便于定位出错的行
        if let Err(e) = Regex::new(&pattern) {
            return Err(parse_error(e.to_string()));
        }

        rules.push(FilterRule::new(kind, pattern));
    }

    Ok(rules)
}

/// 把旧格式中转义的反斜杠分隔符换成 `/`
fn convert_legacy_separators(pattern: &str) -> String {
    match pattern.strip_prefix("\\\\") {
        Some(rest) => format!("(^|/){}", rest.replace("\\\\", "/")),
        None => pattern.replace("\\\\", "/"),
    }
}

/// 规则文件不存在时创建空文件，返回是否新建
pub fn ensure_filter_file(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, "")?;
    info!("已创建空的忽略规则文件: {}", path.display());
    Ok(true)
}

/// 忽略规则存储
#[derive(Debug)]
pub struct IgnoreFilterStore {
    path: PathBuf,
    directory_rules: Vec<String>,
    file_rules: Vec<String>,
    snapshot: FilterSnapshot,
}

impl IgnoreFilterStore {
    /// 从规则文件加载并编译，失败时不会产生任何可用的匹配器
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (directory_rules, file_rules) = Self::read_rules(&path)?;
        let snapshot = FilterSnapshot::compile(&directory_rules, &file_rules)?;

        info!(
            "已加载忽略规则: {} ({} 条目录规则, {} 条文件规则)",
            path.display(),
            directory_rules.len(),
            file_rules.len()
        );

        Ok(Self {
            path,
            directory_rules,
            file_rules,
            snapshot,
        })
    }

    fn read_rules(path: &Path) -> Result<(Vec<String>, Vec<String>)> {
        let content = fs::read_to_string(path).map_err(|source| Error::FilterRead {
            path: path.to_path_buf(),
            source,
        })?;
        let rules = parse_rules(path, &content)?;
        Ok(split_rules(&rules))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 当前规则的编译快照
    pub fn snapshot(&self) -> FilterSnapshot {
        self.snapshot.clone()
    }

    pub fn rules(&self) -> Vec<FilterRule> {
        self.directory_rules
            .iter()
            .map(|p| FilterRule::new(RuleKind::Directory, p.as_str()))
            .chain(
                self.file_rules
                    .iter()
                    .map(|p| FilterRule::new(RuleKind::File, p.as_str())),
            )
            .collect()
    }

    pub fn matches_directory(&self, relative_path: &str) -> bool {
        self.snapshot.matches_directory(relative_path)
    }

    pub fn matches_file(&self, relative_path: &str) -> bool {
        self.snapshot.matches_file(relative_path)
    }

    /// 忽略整个目录（相对路径按字面匹配）
    pub fn add_directory_rule(&mut self, relative_path: &str) -> Result<bool> {
        self.add_rule(FilterRule::literal(RuleKind::Directory, relative_path))
    }

    /// 忽略某个文件（相对路径按字面匹配）
    pub fn add_file_rule(&mut self, relative_path: &str) -> Result<bool> {
        self.add_rule(FilterRule::literal(RuleKind::File, relative_path))
    }

    /// 忽略所有同名文件
    pub fn add_file_name_rule(&mut self, name: &str) -> Result<bool> {
        self.add_rule(FilterRule::literal(RuleKind::File, name))
    }

    /// 追加规则并重新编译，规则已存在时返回 false
    pub fn add_rule(&mut self, rule: FilterRule) -> Result<bool> {
        let group = match rule.kind {
            RuleKind::Directory => &mut self.directory_rules,
            RuleKind::File => &mut self.file_rules,
        };
        if group.contains(&rule.pattern) {
            return Ok(false);
        }
        group.push(rule.pattern.clone());

        match FilterSnapshot::compile(&self.directory_rules, &self.file_rules) {
            Ok(snapshot) => {
                self.snapshot = snapshot;
                debug!("新增忽略规则: {}", rule);
                Ok(true)
            }
            Err(e) => {
                // 编译失败时撤销
                match rule.kind {
                    RuleKind::Directory => self.directory_rules.pop(),
                    RuleKind::File => self.file_rules.pop(),
                };
                Err(e)
            }
        }
    }

    /// 按保存格式输出：目录规则在前，文件规则在后，各自按字典序排列
    pub fn render(&self) -> String {
        let mut directory = self.directory_rules.clone();
        let mut file = self.file_rules.clone();
        directory.sort();
        file.sort();

        let mut out = String::new();
        for pattern in &directory {
            out.push_str(&format!("d: {}\n", pattern));
        }
        for pattern in &file {
            out.push_str(&format!("f: {}\n", pattern));
        }
        out
    }

    /// 写回规则文件，返回写入的规则数；失败时内存中的规则保持不变
    pub fn save(&self) -> Result<usize> {
        fs::write(&self.path, self.render())?;
        let count = self.directory_rules.len() + self.file_rules.len();
        info!("忽略规则已保存: {} ({} 条)", self.path.display(), count);
        Ok(count)
    }

    /// 丢弃内存中的修改，重新从磁盘加载
    pub fn reset(&mut self) -> Result<()> {
        let (directory_rules, file_rules) = Self::read_rules(&self.path)?;
        self.snapshot = FilterSnapshot::compile(&directory_rules, &file_rules)?;
        self.directory_rules = directory_rules;
        self.file_rules = file_rules;
        debug!("忽略规则已重置: {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(content: &str) -> FilterSnapshot {
        let rules = parse_rules(Path::new("test.ignores"), content).unwrap();
        FilterSnapshot::from_rules(&rules).unwrap()
    }

    #[test]
    fn test_parse_rules() {
        let rules = parse_rules(
            Path::new("x"),
            "d: temp$\r\n\nf:  \\.log \rD: build\n",
        )
        .unwrap();

        assert_eq!(
            rules,
            vec![
                FilterRule::new(RuleKind::Directory, "temp$"),
                FilterRule::new(RuleKind::File, "\\.log"),
                FilterRule::new(RuleKind::Directory, "build"),
            ]
        );
    }

    #[test]
    fn test_parse_errors_report_line() {
        let err = parse_rules(Path::new("x"), "d: ok\nf: (unclosed\n").unwrap_err();
        assert!(matches!(err, Error::FilterParse { line: 2, .. }));

        let err = parse_rules(Path::new("x"), "x: whatever").unwrap_err();
        assert!(matches!(err, Error::FilterParse { line: 1, .. }));

        let err = parse_rules(Path::new("x"), "d temp").unwrap_err();
        assert!(matches!(err, Error::FilterParse { .. }));

        let err = parse_rules(Path::new("x"), "f:   ").unwrap_err();
        assert!(matches!(err, Error::FilterParse { .. }));
    }

    #[test]
    fn test_matching_is_anchored_and_case_insensitive() {
        let filters = snapshot("d: temp\nf: \\.log\n");

        assert!(filters.matches_directory("temp"));
        assert!(filters.matches_directory("a/TEMP"));
        assert!(!filters.matches_directory("temp/sub"));

        assert!(filters.matches_file("logs/app.LOG"));
        assert!(!filters.matches_file("app.log.bak"));
    }

    #[test]
    fn test_empty_group_matches_nothing() {
        let filters = snapshot("f: \\.tmp\n");
        assert!(!filters.matches_directory("anything"));
        assert!(!filters.matches_directory(""));
        assert!(!FilterSnapshot::empty().matches_file("a.txt"));
    }

    #[test]
    fn test_literal_rules_escape_metacharacters() {
        let rule = FilterRule::literal(RuleKind::File, "data/report (1).txt");
        let filters = FilterSnapshot::from_rules([&rule]).unwrap();

        assert!(filters.matches_file("data/report (1).txt"));
        assert!(!filters.matches_file("data/report 1.txt"));
        assert!(!filters.matches_file("data/reportX(1)Xtxt"));
    }

    #[test]
    fn test_literal_rules_normalize_separators() {
        let rule = FilterRule::literal(RuleKind::Directory, "\\data\\settings");
        assert_eq!(rule.pattern, "data/settings");
    }

    #[test]
    fn test_is_excluded_checks_ancestors() {
        let filters = snapshot("d: node_modules\nf: \\.bak\n");

        assert!(filters.is_excluded("web/node_modules/lib/index.js"));
        assert!(filters.is_excluded("notes.bak"));
        assert!(!filters.is_excluded("web/src/index.js"));
    }

    #[test]
    fn test_explain() {
        let filters = snapshot("d: cache\nd: a/cache\nf: \\.txt\nf: c\\.txt\n");
        let explanation = filters.explain("a/cache/c.txt");

        assert!(explanation.is_excluded());
        assert_eq!(explanation.directory_matches.len(), 2);
        assert!(explanation
            .directory_matches
            .iter()
            .all(|(dir, _)| dir == "a/cache"));
        assert_eq!(explanation.file_matches, vec!["\\.txt", "c\\.txt"]);

        assert!(!filters.explain("a/keep.md").is_excluded());
    }

    #[test]
    fn test_legacy_backslash_rules() {
        let rules = parse_rules(Path::new("x"), "d: \\\\bin\\\\Debug\nf: \\.log\n").unwrap();
        assert_eq!(rules[0].pattern, "(^|/)bin/Debug");
        assert_eq!(rules[1].pattern, "\\.log");

        let filters = FilterSnapshot::from_rules(&rules).unwrap();
        assert!(filters.matches_directory("bin/Debug"));
        assert!(filters.matches_directory("app/bin/debug"));
        assert!(!filters.matches_directory("cabin/Debug"));
        assert!(filters.matches_file("out/app.log"));
    }

    #[test]
    fn test_ancestor_dirs() {
        let dirs: Vec<_> = ancestor_dirs("a/b/c.txt").collect();
        assert_eq!(dirs, vec!["a", "a/b"]);
        assert_eq!(ancestor_dirs("c.txt").count(), 0);
    }
}
