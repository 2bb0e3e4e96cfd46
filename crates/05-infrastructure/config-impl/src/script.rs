//! 脚本格式配置的受限求值器
//!
//! 不执行任何代码，只接受 JS 数据字面量子集：
//!
//! - 对象（标识符键、引号键、数字键）、数组、尾随逗号
//! - 单引号、双引号、反引号字符串（反引号不支持 `${}` 插值）
//! - 十进制/十六进制/八进制/二进制数字、`true`/`false`/`null`/`undefined`
//! - `//` 与 `/* */` 注释
//!
//! 以及常见的模块外壳：`EXPR`、`() => EXPR`、`() => { return EXPR }`、
//! `(() => EXPR)()`、`module.exports = EXPR`、`exports.default = EXPR`、
//! `export default EXPR`、`registerAs('ns', () => EXPR)`。
//! 结果为零参数工厂函数时会被调用一次。
//!
//! 嵌套深度超过 [`MAX_DEPTH`] 时返回错误。

use serde_json::{Map, Value};
use thiserror::Error;
use winnow::ascii::{digit1, multispace1};
use winnow::combinator::{
    alt, cut_err, delimited, fail, not, opt, peek, preceded, repeat, separated, separated_pair,
    terminated,
};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::stream::Stream;
use winnow::token::{any, one_of, take_till, take_until, take_while};
use winnow::{ModalResult, Parser};

/// 允许的最大嵌套深度
pub const MAX_DEPTH: usize = 128;

/// 脚本求值错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (line {line}, column {column})")]
pub struct ScriptError {
    /// 错误描述
    pub message: String,
    /// 行号（从 1 开始）
    pub line: usize,
    /// 列号（从 1 开始）
    pub column: usize,
}

impl ScriptError {
    fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let consumed = source.get(..offset).unwrap_or(source);
        let line = consumed.matches('\n').count() + 1;
        let column = consumed
            .rfind('\n')
            .map_or(consumed.chars().count(), |i| consumed[i + 1..].chars().count())
            + 1;
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// 求值脚本文本，得到配置值
pub fn evaluate(source: &str) -> Result<Value, ScriptError> {
    let expr = module.parse(source).map_err(|e| {
        let offset = e.offset();
        let rest = source.get(offset..).unwrap_or_default();
        ScriptError::at(source, offset, describe(e.inner(), rest))
    })?;

    let at_end = |message: &str| ScriptError::at(source, source.len(), message);
    match expr {
        Expr::Value(value) => Ok(value),
        Expr::Factory(body) => match *body {
            Expr::Value(value) => Ok(value),
            Expr::Undefined => Err(at_end("factory returned undefined")),
            Expr::Factory(_) => Err(at_end("factory returned a function")),
        },
        Expr::Undefined => Err(at_end("script evaluated to undefined")),
    }
}

fn describe(error: &ContextError, rest: &str) -> String {
    let found = match rest.chars().next() {
        None => "end of input".to_string(),
        Some(c) if is_ident_char(c) => {
            let word = rest.split(|c: char| !is_ident_char(c)).next().unwrap_or_default();
            format!("`{word}`")
        }
        Some(c) => format!("`{c}`"),
    };
    let context = error.to_string().replace('\n', ", ");
    if context.is_empty() {
        format!("unexpected {found}")
    } else {
        format!("{context}, found {found}")
    }
}

#[derive(Debug)]
enum Expr {
    Value(Value),
    Undefined,
    Factory(Box<Expr>),
}

enum Fragment<'s> {
    Literal(&'s str),
    Char(char),
    Escaped(Option<char>),
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn expected_char(c: char) -> StrContext {
    StrContext::Expected(StrContextValue::CharLiteral(c))
}

fn expected(what: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(what))
}

/// 在当前位置报告不可回溯的错误
fn reject<O>(input: &mut &str, label: &'static str) -> ModalResult<O> {
    cut_err(fail.context(StrContext::Label(label))).parse_next(input)
}

/// 空白与注释
fn ws(input: &mut &str) -> ModalResult<()> {
    repeat(
        0..,
        alt((
            multispace1.void(),
            ("//", take_till(0.., '\n')).void(),
            (
                "/*",
                cut_err(terminated(take_until(0.., "*/"), "*/"))
                    .context(StrContext::Label("comment"))
                    .context(expected("`*/`")),
            )
                .void(),
        )),
    )
    .parse_next(input)
}

fn semicolons(input: &mut &str) -> ModalResult<()> {
    ws(input)?;
    repeat(0.., (';', ws)).parse_next(input)
}

fn token<'s>(c: char) -> impl Parser<&'s str, char, ErrMode<ContextError>> {
    preceded(ws, c)
}

fn closing<'s>(c: char) -> impl Parser<&'s str, char, ErrMode<ContextError>> {
    cut_err(token(c)).context(expected_char(c))
}

fn identifier<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    (
        one_of(|c: char| c.is_alphabetic() || c == '_' || c == '$'),
        take_while(0.., is_ident_char),
    )
        .take()
        .parse_next(input)
}

fn keyword<'s>(word: &'static str) -> impl Parser<&'s str, &'s str, ErrMode<ContextError>> {
    identifier.verify(move |w: &str| w == word)
}

fn module(input: &mut &str) -> ModalResult<Expr> {
    semicolons(input)?;
    opt(alt((
        (keyword("module"), ws, '.', ws, keyword("exports"), closing('=')).void(),
        (keyword("exports"), ws, '.', ws, keyword("default"), closing('=')).void(),
        (
            keyword("export"),
            ws,
            cut_err(keyword("default")).context(expected("`default`")),
        )
            .void(),
    )))
    .parse_next(input)?;
    let expr = expression(input, 0)?;
    semicolons(input)?;
    Ok(expr)
}

fn expression(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    if depth > MAX_DEPTH {
        return reject(input, "nesting depth");
    }
    let mut expr = primary(input, depth)?;
    // 零参数调用
    while opt((ws, '(', ws, ')')).parse_next(input)?.is_some() {
        expr = match expr {
            Expr::Factory(body) => *body,
            _ => return reject(input, "call, value is not a function"),
        };
    }
    Ok(expr)
}

fn primary(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    ws(input)?;
    match input.chars().next() {
        Some('(') => group(input, depth),
        Some('{') => object(input, depth).map(Expr::Value),
        Some('[') => array(input, depth).map(Expr::Value),
        Some('"' | '\'' | '`') => quoted.map(|s| Expr::Value(Value::String(s))).parse_next(input),
        Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => {
            number.map(Expr::Value).parse_next(input)
        }
        _ => word(input, depth),
    }
}

/// `( EXPR )` 或 `() => BODY`
fn group(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    token('(').parse_next(input)?;
    if opt(token(')')).parse_next(input)?.is_some() {
        return arrow_body(input, depth);
    }
    let inner = expression(input, depth + 1)?;
    closing(')').parse_next(input)?;
    Ok(inner)
}

fn arrow_body(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    cut_err(preceded(ws, "=>"))
        .context(expected("`=>`"))
        .parse_next(input)?;
    let body = if opt(token('{')).parse_next(input)?.is_some() {
        cut_err(preceded(ws, keyword("return")))
            .context(StrContext::Label("function body"))
            .context(expected("a single `return` statement"))
            .parse_next(input)?;
        let value = cut_err(|i: &mut &str| expression(i, depth + 1)).parse_next(input)?;
        semicolons(input)?;
        closing('}').parse_next(input)?;
        value
    } else {
        cut_err(|i: &mut &str| expression(i, depth + 1)).parse_next(input)?
    };
    Ok(Expr::Factory(Box::new(body)))
}

fn word(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let start = input.checkpoint();
    let name = identifier.context(expected("a value")).parse_next(input)?;
    match name {
        "true" => Ok(Expr::Value(Value::Bool(true))),
        "false" => Ok(Expr::Value(Value::Bool(false))),
        "null" => Ok(Expr::Value(Value::Null)),
        "undefined" => Ok(Expr::Undefined),
        "registerAs" => register_as(input, depth),
        _ => {
            input.reset(&start);
            reject(input, "value, unsupported expression")
        }
    }
}

/// `registerAs('ns', factory)` 得到 `{ns: factory()}`
fn register_as(input: &mut &str, depth: usize) -> ModalResult<Expr> {
    let (namespace, factory) = cut_err(delimited(
        token('('),
        separated_pair(preceded(ws, quoted), token(','), |i: &mut &str| {
            expression(i, depth + 1)
        }),
        (opt(token(',')), token(')')),
    ))
    .context(StrContext::Label("registerAs call"))
    .parse_next(input)?;

    match factory {
        Expr::Factory(body) => match *body {
            Expr::Value(value) => {
                Ok(Expr::Value(Value::Object(Map::from_iter([(namespace, value)]))))
            }
            _ => reject(input, "registerAs factory, it must return a value"),
        },
        _ => reject(input, "registerAs argument, expected a factory function"),
    }
}

fn object(input: &mut &str, depth: usize) -> ModalResult<Value> {
    let entries: Vec<Option<(String, Value)>> = delimited(
        '{',
        terminated(
            separated(0.., |i: &mut &str| property(i, depth), token(',')),
            opt(token(',')),
        ),
        closing('}'),
    )
    .parse_next(input)?;
    Ok(Value::Object(entries.into_iter().flatten().collect()))
}

/// 对象属性，值为 `undefined` 时返回 `None`
fn property(input: &mut &str, depth: usize) -> ModalResult<Option<(String, Value)>> {
    ws(input)?;
    let key = alt((
        preceded(peek(one_of(['"', '\''])), quoted),
        digit1.map(str::to_owned),
        identifier.map(str::to_owned),
    ))
    .parse_next(input)?;
    closing(':').parse_next(input)?;
    match cut_err(|i: &mut &str| expression(i, depth + 1)).parse_next(input)? {
        Expr::Value(value) => Ok(Some((key, value))),
        Expr::Undefined => Ok(None),
        Expr::Factory(_) => reject(input, "property value, functions are not allowed"),
    }
}

fn array(input: &mut &str, depth: usize) -> ModalResult<Value> {
    let items: Vec<Value> = delimited(
        '[',
        terminated(
            separated(0.., |i: &mut &str| element(i, depth), token(',')),
            opt(token(',')),
        ),
        closing(']'),
    )
    .parse_next(input)?;
    Ok(Value::Array(items))
}

/// 数组元素，`undefined` 记为 `null`
fn element(input: &mut &str, depth: usize) -> ModalResult<Value> {
    ws(input)?;
    if input.starts_with(']') {
        return fail(input);
    }
    match cut_err(|i: &mut &str| expression(i, depth + 1)).parse_next(input)? {
        Expr::Value(value) => Ok(value),
        Expr::Undefined => Ok(Value::Null),
        Expr::Factory(_) => reject(input, "array element, functions are not allowed"),
    }
}

fn quoted(input: &mut &str) -> ModalResult<String> {
    let quote = one_of(['"', '\'', '`']).parse_next(input)?;
    let fragments: Vec<Fragment<'_>> = repeat(0.., fragment(quote)).parse_next(input)?;
    cut_err(quote)
        .context(StrContext::Label("string literal"))
        .context(expected("closing quote"))
        .parse_next(input)?;

    let mut out = String::new();
    for fragment in fragments {
        match fragment {
            Fragment::Literal(text) => out.push_str(text),
            Fragment::Char(c) | Fragment::Escaped(Some(c)) => out.push(c),
            Fragment::Escaped(None) => {}
        }
    }
    Ok(out)
}

fn fragment<'s>(quote: char) -> impl Parser<&'s str, Fragment<'s>, ErrMode<ContextError>> {
    alt((
        take_till(1.., move |c: char| c == quote || matches!(c, '\\' | '\n' | '$'))
            .map(Fragment::Literal),
        preceded('\\', cut_err(escape)).map(Fragment::Escaped),
        '\n'.verify(move |_: &char| quote == '`').map(Fragment::Char),
        // 反引号中的 `${` 是插值，不支持
        "${".verify(move |_: &str| quote != '`').map(Fragment::Literal),
        terminated('$', not('{')).map(Fragment::Char),
    ))
}

/// 反斜杠之后的转义序列，行继续返回 `None`
fn escape(input: &mut &str) -> ModalResult<Option<char>> {
    let hex = |c: char| c.is_ascii_hexdigit();
    let c = any.parse_next(input)?;
    let escaped = match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'b' => '\u{8}',
        'f' => '\u{c}',
        'v' => '\u{b}',
        '0' => '\0',
        '\n' => return Ok(None),
        'x' => take_while(2usize, hex)
            .try_map(|digits: &str| u32::from_str_radix(digits, 16))
            .verify_map(char::from_u32)
            .context(StrContext::Label("hex escape"))
            .parse_next(input)?,
        'u' => alt((delimited('{', take_while(1..=6usize, hex), '}'), take_while(4usize, hex)))
            .try_map(|digits: &str| u32::from_str_radix(digits, 16))
            .verify_map(char::from_u32)
            .context(StrContext::Label("unicode escape"))
            .parse_next(input)?,
        other => other,
    };
    Ok(Some(escaped))
}

fn number(input: &mut &str) -> ModalResult<Value> {
    let negative = opt(one_of(['-', '+'])).parse_next(input)? == Some('-');
    ws(input)?;

    if let Some(magnitude) = opt(radix_integer).parse_next(input)? {
        return Ok(Value::from(if negative { -magnitude } else { magnitude }));
    }

    let literal = cut_err(decimal_literal)
        .context(StrContext::Label("number"))
        .parse_next(input)?;
    if !literal.contains(['.', 'e', 'E']) {
        if let Ok(n) = literal.parse::<i64>() {
            return Ok(Value::from(if negative { -n } else { n }));
        }
    }
    match literal.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(Value::from(if negative { -f } else { f })),
        _ => reject(input, "number, it is not finite"),
    }
}

/// `0x`/`0o`/`0b` 前缀整数
fn radix_integer(input: &mut &str) -> ModalResult<i64> {
    let radix = preceded(
        '0',
        alt((
            one_of(['x', 'X']).value(16),
            one_of(['o', 'O']).value(8),
            one_of(['b', 'B']).value(2),
        )),
    )
    .parse_next(input)?;
    cut_err(
        take_while(1.., move |c: char| c.is_digit(radix))
            .try_map(move |digits: &str| i64::from_str_radix(digits, radix)),
    )
    .context(StrContext::Label("integer literal"))
    .parse_next(input)
}

fn decimal_literal<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    (
        take_while(0.., |c: char| c.is_ascii_digit()),
        opt(('.', take_while(0.., |c: char| c.is_ascii_digit()))),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), cut_err(digit1))),
    )
        .take()
        .verify(|literal: &str| literal.chars().any(|c| c.is_ascii_digit()))
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_object_literal() {
        let value =
            evaluate("{ps: 'string', pn: 10, pb: true, 'quoted-key': \"x\", 42: [1, 2,],}").unwrap();
        assert_eq!(
            value,
            json!({"ps": "string", "pn": 10, "pb": true, "quoted-key": "x", "42": [1, 2]})
        );
    }

    #[test]
    fn test_module_shapes() {
        let expected = json!({"a": 1});
        for source in [
            "({a: 1})",
            "() => ({a: 1})",
            "(() => ({a: 1}))()",
            ";(() => ({a: 1}))();",
            "exports.default = () => ({a: 1})",
            "module.exports = {a: 1};",
            "export default {a: 1}",
            "() => { return {a: 1}; }",
        ] {
            assert_eq!(evaluate(source).unwrap(), expected, "source: {source}");
        }
    }

    #[test]
    fn test_register_as() {
        let value = evaluate("registerAs('database', () => ({host: 'localhost'}))").unwrap();
        assert_eq!(value, json!({"database": {"host": "localhost"}}));
    }

    #[test]
    fn test_nested_levels_and_comments() {
        let source = r"
            // leading comment
            exports.default = () => ({
                l1: { l2: { l3: 'L3' }, l2b: 'L2B' }, /* inline */
                skipped: undefined,
                list: [undefined, 'x'],
            })
        ";
        assert_eq!(
            evaluate(source).unwrap(),
            json!({"l1": {"l2": {"l3": "L3"}, "l2b": "L2B"}, "list": [null, "x"]})
        );
    }

    #[test]
    fn test_numbers() {
        let value = evaluate("{a: -5, b: 0x1F, c: 1.5e3, d: .25, e: +7, f: 0b101, g: 0}").unwrap();
        assert_eq!(
            value,
            json!({"a": -5, "b": 31, "c": 1500.0, "d": 0.25, "e": 7, "f": 5, "g": 0})
        );
    }

    #[test]
    fn test_string_escapes() {
        let value = evaluate(
            r#"{a: 'it\'s', b: "tab\there", c: `multi
line`, d: 'A\u{1F600}', e: '\x41$5', f: "${raw}"}"#,
        )
        .unwrap();
        assert_eq!(value["a"], json!("it's"));
        assert_eq!(value["b"], json!("tab\there"));
        assert_eq!(value["c"], json!("multi\nline"));
        assert_eq!(value["d"], json!("A\u{1F600}"));
        assert_eq!(value["e"], json!("A$5"));
        assert_eq!(value["f"], json!("${raw}"));
    }

    #[test]
    fn test_rejects_code() {
        assert!(evaluate("{a: process.env.HOME}").is_err());
        assert!(evaluate("{a: `${x}`}").is_err());
        assert!(evaluate("{a: 1} + {b: 2}").is_err());
        assert!(evaluate("require('fs')").is_err());
        assert!(evaluate("({a: 1})()").is_err());
        assert!(evaluate("{a: 'unterminated}").is_err());
        assert!(evaluate("/* open comment {a: 1}").is_err());
        assert!(evaluate("").is_err());
    }

    #[test]
    fn test_error_position() {
        let err = evaluate("{\n  a: 1,\n  b: nope\n}").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.column, 6);
        assert!(err.message.contains("nope"), "{}", err.message);
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let nested = |depth: usize| format!("{}{}", "[".repeat(depth), "]".repeat(depth));
        assert!(evaluate(&format!("{{a: {}}}", nested(MAX_DEPTH - 2))).is_ok());

        for depth in [MAX_DEPTH + 10, 10_000] {
            let err = evaluate(&format!("{{a: {}}}", nested(depth))).unwrap_err();
            assert!(err.message.contains("nesting depth"), "{}", err.message);
        }
        let parens = format!("{}{{}}{}", "(".repeat(5_000), ")".repeat(5_000));
        assert!(evaluate(&parens).is_err());
    }
}
