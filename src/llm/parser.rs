//! 结构化回复解析
//!
//! LLM 的结构化输出约定为 Markdown 围栏块（```yaml ... ``` 或裸 ```）。
//! extract_fenced_block 提取围栏内容；parse_yaml_reply 进一步解析为 YAML，
//! 解析失败时返回空 mapping 而非报错（单条坏回复不应击穿流程）。

/// 提取回复中的围栏块内容：优先 ```yaml 围栏，其次第一个裸 ``` 围栏，都没有则返回整体 trim
pub fn extract_fenced_block(reply: &str) -> &str {
    let trimmed = reply.trim();

    if let Some(start) = trimmed.find("```yaml") {
        let rest = &trimmed[start + 7..];
        return rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
    }

    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        // 跳过围栏首行的语言标记（如 ```json）
        let rest = match rest.find('\n') {
            Some(nl) if rest[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
                &rest[nl + 1..]
            }
            _ => rest,
        };
        return rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
    }

    trimmed
}

/// 解析 YAML 回复；围栏提取后交给 serde_yaml，失败返回空 mapping
pub fn parse_yaml_reply(reply: &str) -> serde_yaml::Value {
    let block = extract_fenced_block(reply);
    match serde_yaml::from_str(block) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "YAML 解析失败，返回空 mapping");
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
        }
    }
}
