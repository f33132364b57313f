//! 列转换规则：把配置中的转换声明翻译为 SQL 投影片段。

use serde_yaml::Value;
use thiserror::Error;

use crate::config::TransformDecl;
use crate::driver::escape_backtick;

/// 目前唯一的预设：`if_not_empty(a, b)`，a 非空时取 b，否则取 a
pub const PRESET_IF_NOT_EMPTY: &str = "if_not_empty";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("列 {column} 的转换类型 \"{kind}\" 无效")]
    InvalidTransformType { column: String, kind: String },

    #[error("列 {column} 使用了不支持的预设 \"{name}\"")]
    UnknownPreset { column: String, name: String },

    #[error("列 {column} 的转换参数无效: {reason}")]
    InvalidArguments { column: String, reason: String },
}

/// 单列的转换规则
#[derive(Debug, Clone, PartialEq)]
pub enum TransformRule {
    /// 原样插入的 SQL 表达式
    Raw(String),
    /// 固定的字符串字面量（不转义内部的单引号）
    StringLiteral(String),
    /// `name(arg1,arg2,...)`
    FunctionCall { name: String, args: Vec<String> },
    /// 命名的参数化模板
    Preset { name: String, args: Vec<String> },
    /// 简写形式：`column: "expr"`
    DirectAlias(String),
}

impl TransformRule {
    pub fn from_decl(
        column: &str,
        decl: &TransformDecl,
    ) -> Result<Self, BuildError> {
        let (kind, value, args) = match decl {
            TransformDecl::Alias(value) => {
                return scalar_text(value)
                    .map(TransformRule::DirectAlias)
                    .ok_or_else(|| BuildError::InvalidTransformType {
                        column: column.to_string(),
                        kind: yaml_kind(value).to_string(),
                    });
            }
            TransformDecl::Typed { kind, value, args } => (kind.as_str(), value, args),
        };

        let invalid_args = |reason: &str| BuildError::InvalidArguments {
            column: column.to_string(),
            reason: reason.to_string(),
        };
        let value_text = || scalar_text(value).ok_or_else(|| invalid_args("value 必须是标量"));
        let args_text = || {
            args.iter()
                .map(|arg| scalar_text(arg).ok_or_else(|| invalid_args("args 只能包含标量")))
                .collect::<Result<Vec<_>, _>>()
        };

        match kind {
            "raw" => Ok(TransformRule::Raw(value_text()?)),
            "string" => match value {
                Value::Null => Ok(TransformRule::StringLiteral(String::new())),
                _ => Ok(TransformRule::StringLiteral(value_text()?)),
            },
            "function" => Ok(TransformRule::FunctionCall {
                name: value_text()?,
                args: args_text()?,
            }),
            "preset" => Ok(TransformRule::Preset {
                name: value_text()?,
                args: args_text()?,
            }),
            other => Err(BuildError::InvalidTransformType {
                column: column.to_string(),
                kind: other.to_string(),
            }),
        }
    }

    /// 列值表达式（不含别名）
    pub fn expression(
        &self,
        column: &str,
    ) -> Result<String, BuildError> {
        match self {
            TransformRule::Raw(expr) | TransformRule::DirectAlias(expr) => Ok(expr.clone()),
            TransformRule::StringLiteral(value) => Ok(format!("'{}'", value)),
            TransformRule::FunctionCall { name, args } => {
                if name.trim().is_empty() {
                    return Err(BuildError::InvalidArguments {
                        column: column.to_string(),
                        reason: "缺少函数名".into(),
                    });
                }
                Ok(format!("{}({})", name, args.join(",")))
            }
            TransformRule::Preset { name, args } => preset_expression(column, name, args),
        }
    }

    /// `<expr> as `column``
    pub fn projection(
        &self,
        column: &str,
    ) -> Result<String, BuildError> {
        Ok(format!("{} as {}", self.expression(column)?, quote_ident(column)))
    }
}

fn preset_expression(
    column: &str,
    name: &str,
    args: &[String],
) -> Result<String, BuildError> {
    match name {
        PRESET_IF_NOT_EMPTY => match args {
            [a, b, ..] => Ok(format!("if(bit_length({a}),{b},{a})")),
            _ => Err(BuildError::InvalidArguments {
                column: column.to_string(),
                reason: format!("预设 \"{}\" 需要 2 个参数", PRESET_IF_NOT_EMPTY),
            }),
        },
        other => Err(BuildError::UnknownPreset {
            column: column.to_string(),
            name: other.to_string(),
        }),
    }
}

/// 某列的投影片段；没有转换声明时原样选择该列
pub fn resolve(
    column: &str,
    decl: Option<&TransformDecl>,
) -> Result<String, BuildError> {
    match decl {
        Some(decl) => TransformRule::from_decl(column, decl)?.projection(column),
        None => Ok(quote_ident(column)),
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("`{}`", escape_backtick(name))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn yaml_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}
