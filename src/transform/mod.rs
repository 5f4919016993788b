//! Code transformation
//!
//! Turns ES modules written in TypeScript or JavaScript into statements that
//! can share one ExtendScript function scope, then assembles the bundle.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::bundler::{ModuleType, Ponyfill};

static IMPORT_STATEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+(?:type\s+)?(?:[^'";]*?\s+from\s+)?["'][^"']+["'][ \t]*;?[ \t]*\r?\n?"#)
        .expect("valid import regex")
});

static EXPORT_LIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*export\s+(?:type\s+)?(?:\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})(?:\s+from\s+["'][^"']+["'])?[ \t]*;?[ \t]*\r?\n?"#)
        .expect("valid export list regex")
});

static EXPORT_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+(?:default\s+)?").expect("valid export regex")
});

static DECLARATION_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:let|const|var)\s+(?:[\w$]+\s*(?:=[^;,{}()\[\]]*)?,\s*)*[\w$]+\s*$")
        .expect("valid declaration regex")
});

static CLASS_HEADER_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bclass\s+[\w$]+(?:\s+extends\s+[\w$.]+)?\s*$").expect("valid class regex")
});

static FUNCTION_NAME_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bfunction\s*[\w$]*\s*$").expect("valid function regex")
});

/// Transforms modules and assembles the bundle
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    ponyfills: Vec<Ponyfill>,
}

impl Transformer {
    pub fn new(ponyfills: Vec<Ponyfill>) -> Self {
        Self { ponyfills }
    }

    /// Transform source code based on module type
    pub fn transform(&self, source: &str, path: &Path, module_type: ModuleType) -> String {
        debug!("Transforming {:?}: {}", module_type, path.display());

        let flattened = strip_module_syntax(source);
        lower(&flattened, module_type.is_typescript())
    }

    /// Substitute ponyfilled APIs in `body` and wrap it in the ExtendScript
    /// IIFE, assigning `global_name` to the host's global object.
    pub fn wrap(&self, body: &str, global_name: &str) -> String {
        let mut code = body.to_string();
        let mut injects = Vec::new();

        for ponyfill in &self.ponyfills {
            if let Some(replaced) = replace_api(&code, &ponyfill.find, &ponyfill.replace) {
                debug!("Applied ponyfill {} -> {}", ponyfill.find, ponyfill.replace);
                code = replaced;
                injects.push(ponyfill.inject.as_str());
            }
        }

        let mut bundle = String::with_capacity(code.len() + 128);
        bundle.push_str("(function (thisObj) {\n");
        for inject in injects {
            bundle.push_str(inject);
            bundle.push('\n');
        }
        bundle.push_str(&code);
        if !code.ends_with('\n') {
            bundle.push('\n');
        }
        bundle.push_str(&format!("thisObj.{0} = {0};\n", global_name));
        bundle.push_str("})(this);\n");
        bundle
    }
}

/// Remove import statements and export syntax, keeping exported declarations
pub fn strip_module_syntax(source: &str) -> String {
    let without_imports = IMPORT_STATEMENT.replace_all(source, "");
    let without_lists = EXPORT_LIST.replace_all(&without_imports, "");
    EXPORT_KEYWORD.replace_all(&without_lists, "$1").into_owned()
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Last non-whitespace character of `out`
fn last_significant(out: &str) -> Option<char> {
    out.chars().rev().find(|c| !c.is_whitespace())
}

/// The end of `out`, on a char boundary, for tail-anchored regexes
fn tail(out: &str, max: usize) -> &str {
    let mut start = out.len().saturating_sub(max);
    while !out.is_char_boundary(start) {
        start += 1;
    }
    &out[start..]
}

/// Whether a `/` after `prev` starts a regular expression literal
fn starts_regex(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(c) => "(,=:[!&|?{};+-*%<>~^".contains(c),
    }
}

/// End index of the string, template, comment or regex literal starting at
/// `i`, if one starts there
fn literal_end(chars: &[char], i: usize, prev: Option<char>) -> Option<usize> {
    let next = chars.get(i + 1).copied();
    match chars[i] {
        quote @ ('"' | '\'' | '`') => {
            let mut j = i + 1;
            while j < chars.len() {
                match chars[j] {
                    '\\' => j += 2,
                    c if c == quote => return Some(j + 1),
                    '\n' if quote != '`' => return Some(j),
                    _ => j += 1,
                }
            }
            Some(chars.len())
        }
        '/' if next == Some('/') => {
            let end = chars[i..]
                .iter()
                .position(|&c| c == '\n')
                .map_or(chars.len(), |p| i + p);
            Some(end)
        }
        '/' if next == Some('*') => {
            let mut j = i + 2;
            while j + 1 < chars.len() && !(chars[j] == '*' && chars[j + 1] == '/') {
                j += 1;
            }
            Some((j + 2).min(chars.len()))
        }
        '/' if starts_regex(prev) => {
            let mut j = i + 1;
            let mut in_class = false;
            while j < chars.len() {
                match chars[j] {
                    '\\' => j += 1,
                    '[' => in_class = true,
                    ']' => in_class = false,
                    '/' if !in_class => break,
                    '\n' => return Some(j),
                    _ => {}
                }
                j += 1;
            }
            j = (j + 1).min(chars.len());
            while j < chars.len() && chars[j].is_alphabetic() {
                j += 1;
            }
            Some(j)
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opener {
    Paren,
    Bracket,
    Brace { class_body: bool },
}

/// Where a type expression ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeEnd {
    /// First top-level blank, as after `as`
    Space,
    /// First top-level delimiter
    Delimiter,
    /// As `Delimiter`, but also at an arrow that is not part of a function type
    ReturnType,
}

/// Skip a type expression starting at `start`; returns the index just past it.
fn skip_type(chars: &[char], start: usize, end: TypeEnd) -> usize {
    let mut i = start;
    while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
        i += 1;
    }
    let type_start = i;
    let mut depth = 0usize;
    // a top-level `(...)` just closed, so a following `=>` is a function type
    let mut after_params = false;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '=' if chars.get(i + 1) == Some(&'>') => {
                if end == TypeEnd::ReturnType && depth == 0 && !after_params {
                    break;
                }
                after_params = false;
                i += 2;
                continue;
            }
            ' ' | '\t' if end == TypeEnd::Space && depth == 0 && i > type_start => break,
            ' ' | '\t' => {
                i += 1;
                continue;
            }
            '"' | '\'' => {
                i = literal_end(chars, i, None).unwrap_or(i + 1);
                continue;
            }
            '{' if depth == 0 && i > type_start => break,
            '<' | '(' | '[' | '{' => depth += 1,
            '>' | ')' | ']' | '}' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                after_params = depth == 0 && c == ')';
                i += 1;
                continue;
            }
            '=' | ',' | ';' | '\n' if depth == 0 => break,
            _ => {}
        }
        after_params = false;
        i += 1;
    }

    while i > type_start && (chars[i - 1] == ' ' || chars[i - 1] == '\t') {
        i -= 1;
    }
    i
}

/// Skip to the end of the statement starting at `start`, including a
/// balanced block and a trailing `;`
fn skip_statement(chars: &[char], start: usize) -> usize {
    let mut i = start;
    let mut depth = 0usize;

    while i < chars.len() {
        match chars[i] {
            '"' | '\'' | '`' => {
                i = literal_end(chars, i, None).unwrap_or(i + 1);
                continue;
            }
            '{' | '(' | '[' | '<' => depth += 1,
            '}' | ')' | ']' | '>' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && chars[i] == '}' && !continues_type(chars, i + 1) {
                    return i + 1;
                }
            }
            ';' if depth == 0 => return i + 1,
            '\n' if depth == 0 && !continues_type(chars, i + 1) => return i + 1,
            _ => {}
        }
        i += 1;
    }
    i
}

/// Whether the type text goes on after `i` (an `=`, `|` or `&` follows)
fn continues_type(chars: &[char], i: usize) -> bool {
    chars[i.min(chars.len())..]
        .iter()
        .find(|c| !c.is_whitespace())
        .is_some_and(|c| matches!(c, '=' | '|' | '&'))
}

/// Skip a balanced `<...>` starting at `start`
fn skip_angle(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    i
}

fn is_modifier(word: &str) -> bool {
    matches!(word, "public" | "private" | "protected" | "readonly")
}

fn next_word(chars: &[char], from: usize) -> Option<(usize, String)> {
    let mut i = from;
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    let start = i;
    while i < chars.len() && is_ident_char(chars[i]) {
        i += 1;
    }
    (i > start).then(|| (i, chars[start..i].iter().collect()))
}

/// Lower block-scoped declarations to `var` and, for TypeScript, strip
/// interfaces, type aliases, `declare` statements, annotations, generics on
/// functions, `as` casts, `implements` clauses and member modifiers.
pub fn lower(source: &str, typescript: bool) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut stack: Vec<Opener> = Vec::new();
    let mut ternaries: Vec<usize> = vec![0];
    let mut parameter_properties: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(end) = literal_end(&chars, i, last_significant(&out)) {
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }

        let word_start = is_ident_char(c) && (i == 0 || !is_ident_char(chars[i - 1]));
        if word_start && !c.is_ascii_digit() {
            let mut end = i;
            while end < chars.len() && is_ident_char(chars[end]) {
                end += 1;
            }
            let word: String = chars[i..end].iter().collect();
            let followed_by_space = chars.get(end).is_some_and(|c| c.is_whitespace());
            let after_dot = last_significant(&out) == Some('.');

            match word.as_str() {
                "let" | "const" if followed_by_space && !after_dot => {
                    if next_word(&chars, end).is_some_and(|(_, w)| w == "enum") {
                        out.push_str(&word);
                    } else {
                        out.push_str("var");
                    }
                    i = end;
                    continue;
                }
                "interface" if typescript && followed_by_space && !after_dot => {
                    let is_declaration = next_word(&chars, end).is_some_and(|(after, _)| {
                        let rest = &chars[after..];
                        let next = rest.iter().position(|c| !c.is_whitespace());
                        next.is_some_and(|n| {
                            matches!(rest[n], '{' | '<')
                                || next_word(rest, n).is_some_and(|(_, w)| w == "extends")
                        })
                    });
                    if is_declaration {
                        i = skip_statement(&chars, end);
                        continue;
                    }
                }
                "type" if typescript && followed_by_space && !after_dot => {
                    let is_alias = next_word(&chars, end).is_some_and(|(after, _)| {
                        chars[after..]
                            .iter()
                            .find(|c| !c.is_whitespace())
                            .is_some_and(|c| *c == '=' || *c == '<')
                    });
                    if is_alias {
                        i = skip_statement(&chars, end);
                        continue;
                    }
                }
                "declare" if typescript && followed_by_space && !after_dot => {
                    let declares = next_word(&chars, end).is_some_and(|(_, w)| {
                        matches!(
                            w.as_str(),
                            "const" | "let" | "var" | "function" | "class" | "module"
                                | "namespace" | "global" | "enum" | "type" | "interface"
                                | "abstract"
                        )
                    });
                    if declares {
                        i = skip_statement(&chars, end);
                        continue;
                    }
                }
                "as" if typescript && followed_by_space => {
                    let prev = last_significant(&out);
                    if prev.is_some_and(|p| is_ident_char(p) || p == ')' || p == ']') {
                        while out.ends_with(' ') {
                            out.pop();
                        }
                        i = skip_type(&chars, end, TypeEnd::Space);
                        continue;
                    }
                }
                "implements" if typescript && followed_by_space => {
                    while i < chars.len() && chars[i] != '{' {
                        i += 1;
                    }
                    continue;
                }
                "public" | "private" | "protected" | "readonly"
                    if typescript
                        && followed_by_space
                        && matches!(stack.last(), Some(Opener::Brace { class_body: true }) | Some(Opener::Paren)) =>
                {
                    // constructor parameter property
                    if stack.last() == Some(&Opener::Paren) {
                        if let Some((_, name)) = next_word(&chars, end) {
                            if !is_modifier(&name) {
                                parameter_properties.push(name);
                            }
                        }
                    }
                    i = end;
                    while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
                        i += 1;
                    }
                    continue;
                }
                _ => {}
            }

            out.push_str(&word);
            i = end;
            continue;
        }

        match c {
            '<' if typescript && FUNCTION_NAME_TAIL.is_match(tail(&out, 80)) => {
                i = skip_angle(&chars, i);
                continue;
            }
            '(' => {
                stack.push(Opener::Paren);
                ternaries.push(0);
            }
            '[' => {
                stack.push(Opener::Bracket);
                ternaries.push(0);
            }
            '{' => {
                let class_body = CLASS_HEADER_TAIL.is_match(tail(&out, 160));
                let constructor_body = !parameter_properties.is_empty()
                    && !matches!(stack.last(), Some(Opener::Paren));
                stack.push(Opener::Brace { class_body });
                ternaries.push(0);
                if constructor_body {
                    out.push(c);
                    for name in parameter_properties.drain(..) {
                        out.push_str(&format!(" this.{name} = {name};"));
                    }
                    i += 1;
                    continue;
                }
            }
            ')' | ']' | '}' => {
                stack.pop();
                if ternaries.len() > 1 {
                    ternaries.pop();
                }
            }
            '?' => match chars.get(i + 1) {
                Some(':') if typescript => {
                    // optional parameter or member
                    i += 1;
                    continue;
                }
                Some('.') | Some('?') => {
                    out.push(c);
                    out.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                _ => {
                    if let Some(count) = ternaries.last_mut() {
                        *count += 1;
                    }
                }
            },
            '!' if typescript
                && matches!(chars.get(i + 1), Some('.') | Some(')') | Some(';') | Some(','))
                && last_significant(&out).is_some_and(|p| is_ident_char(p) || p == ')' || p == ']') =>
            {
                // non-null assertion
                i += 1;
                continue;
            }
            ':' => {
                let pending = ternaries.last().copied().unwrap_or(0);
                if pending > 0 {
                    if let Some(count) = ternaries.last_mut() {
                        *count -= 1;
                    }
                } else if typescript && is_annotation(&out, &stack) {
                    let end = if last_significant(&out) == Some(')') {
                        TypeEnd::ReturnType
                    } else {
                        TypeEnd::Delimiter
                    };
                    i = skip_type(&chars, i + 1, end);
                    continue;
                }
            }
            _ => {}
        }

        out.push(c);
        i += 1;
    }

    out
}

fn is_annotation(out: &str, stack: &[Opener]) -> bool {
    let Some(prev) = last_significant(out) else {
        return false;
    };

    if prev == ')' {
        return true;
    }
    if !is_ident_char(prev) {
        return false;
    }

    match stack.last() {
        Some(Opener::Paren) | Some(Opener::Brace { class_body: true }) => true,
        _ => DECLARATION_TAIL.is_match(tail(out, 160)),
    }
}

/// Replace every standalone occurrence of `find` (not part of a longer
/// member chain) with `replace`; `None` if nothing matched
pub fn replace_api(code: &str, find: &str, replace: &str) -> Option<String> {
    let mut result = String::with_capacity(code.len());
    let mut last = 0;
    let mut replaced = false;

    for (pos, _) in code.match_indices(find) {
        if pos < last {
            continue;
        }
        let before = code[..pos].chars().next_back();
        let after = code[pos + find.len()..].chars().next();
        let bounded = !before.is_some_and(|c| is_ident_char(c) || c == '.')
            && !after.is_some_and(is_ident_char);
        if !bounded {
            continue;
        }
        result.push_str(&code[last..pos]);
        result.push_str(replace);
        last = pos + find.len();
        replaced = true;
    }

    if !replaced {
        return None;
    }
    result.push_str(&code[last..]);
    Some(result)
}

/// Remove comments and redundant whitespace.
///
/// Line breaks are kept where statements may rely on automatic semicolon
/// insertion; `aggressive` drops the ones that follow or precede
/// punctuation that cannot end or start a statement.
pub fn minify(code: &str, aggressive: bool) -> String {
    let chars: Vec<char> = code.chars().collect();
    let mut result = String::with_capacity(code.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '/' && matches!(chars.get(i + 1), Some('/') | Some('*')) {
            i = literal_end(&chars, i, None).unwrap_or(i + 1);
            // a removed block comment still separates tokens
            if !result.ends_with(char::is_whitespace) && i < chars.len() && !chars[i].is_whitespace() {
                result.push(' ');
            }
            continue;
        }

        if let Some(end) = literal_end(&chars, i, last_significant(&result)) {
            result.extend(&chars[i..end]);
            i = end;
            continue;
        }

        if c.is_whitespace() {
            let mut newline = false;
            while i < chars.len() && chars[i].is_whitespace() {
                newline |= chars[i] == '\n';
                i += 1;
            }
            // trailing blanks left by an earlier comment
            while result.ends_with(' ') {
                result.pop();
            }

            let prev = result.chars().next_back();
            let next = chars.get(i).copied();
            let (Some(prev), Some(next)) = (prev, next) else {
                continue;
            };

            if newline {
                let joinable = aggressive
                    && ("{}(,;[=:?&|+".contains(prev) || "}),;:]?.".contains(next));
                if joinable {
                    if needs_space(prev, next) {
                        result.push(' ');
                    }
                } else if !result.ends_with('\n') {
                    result.push('\n');
                }
            } else if needs_space(prev, next) {
                result.push(' ');
            }
            continue;
        }

        result.push(c);
        i += 1;
    }

    result.trim().to_string() + "\n"
}

/// Whether two tokens would merge without a blank between them
fn needs_space(prev: char, next: char) -> bool {
    (is_ident_char(prev) && is_ident_char(next))
        || (prev == '+' && next == '+')
        || (prev == '-' && next == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::base_ponyfills;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_module_syntax_is_flattened() {
        let source = "import { helper } from './helper';\nimport type { Shape } from './types';\nimport {\n  a,\n  b,\n} from \"./ab\";\nexport function main() { return helper(); }\nexport default main;\nexport { a, b };\nexport * from './all';\nexport const KT = { main: main };\n";

        assert_eq!(
            strip_module_syntax(source),
            "function main() { return helper(); }\nmain;\nconst KT = { main: main };\n"
        );
    }

    #[test]
    fn test_type_annotations_are_removed() {
        let source = r#"interface Options {
  name: string;
  nested: { deep: number };
}
type Mode = 'a' | 'b';
declare const app: any;
function greet(name: string, times?: number): string {
  const label: string = name as string;
  let flag = times ? label : "none";
  return label + flag!;
}
"#;
        let lowered = lower(source, true);

        assert_eq!(
            lowered,
            r#"


function greet(name, times) {
  var label = name;
  var flag = times ? label : "none";
  return label + flag;
}
"#
        );
    }

    #[test]
    fn test_object_literals_and_ternaries_survive() {
        let source = "var KT = { create: Factory, mode: isDev ? Dev : Prod };\nvar url = 'http://x';\n";
        assert_eq!(lower(source, true), source);
    }

    #[test]
    fn test_javascript_only_lowers_declarations() {
        let source = "const a = { b: B };\nlet c = a.b;\nvar constant = 1;\n";
        assert_eq!(
            lower(source, false),
            "var a = { b: B };\nvar c = a.b;\nvar constant = 1;\n"
        );
    }

    #[test]
    fn test_typed_arrow_functions_keep_their_body() {
        let source = "const f = (a: number): number => a + 1;\nconst h = (): () => void => run;\nconst g = 2;\n";
        assert_eq!(
            lower(source, true),
            "var f = (a) => a + 1;\nvar h = () => run;\nvar g = 2;\n"
        );
    }

    #[test]
    fn test_parameter_properties_are_assigned() {
        let source = "class Point {\n  constructor(private x: number, public readonly y: number) {\n    draw();\n  }\n}\n";
        assert_eq!(
            lower(source, true),
            "class Point {\n  constructor(x, y) { this.x = x; this.y = y;\n    draw();\n  }\n}\n"
        );
    }

    #[test]
    fn test_contextual_keywords_as_identifiers() {
        let source = "interface Shape extends Base { size: number }\nlet declare = 1;\nlet interface = 2;\n";
        assert_eq!(
            lower(source, true),
            "\nvar declare = 1;\nvar interface = 2;\n"
        );
    }

    #[test]
    fn test_ponyfills_are_applied_and_injected_once() {
        let transformer = Transformer::new(base_ponyfills());
        let bundle = transformer.wrap(
            "var a = Object.create(p);\nvar b = Object.create(q);\nvar c = MyObject.create();\n",
            "KT",
        );

        assert!(bundle.starts_with("(function (thisObj) {\nfunction __objectCreate"));
        assert_eq!(bundle.matches("function __objectCreate").count(), 1);
        assert!(bundle.contains("var a = __objectCreate(p);"));
        assert!(bundle.contains("MyObject.create()"));
        assert!(!bundle.contains("__objectAssign"));
        assert!(bundle.ends_with("thisObj.KT = KT;\n})(this);\n"));
    }

    #[test]
    fn test_minify_strips_comments_and_keeps_strings() {
        let code = "// header\nvar a = 1;   /* note */\nvar s = \"a  //  b\";\n\n\nreturn a\n";
        assert_eq!(minify(code, false), "var a=1;\nvar s=\"a  //  b\";\nreturn a\n");
        assert_eq!(minify(code, true), "var a=1;var s=\"a  //  b\";return a\n");
    }

    #[test]
    fn test_minify_keeps_regex_literals() {
        let code = "var re = /['\"]+/g;\n";
        assert_eq!(minify(code, false), "var re=/['\"]+/g;\n");
    }
}
