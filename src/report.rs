//! 研报类型配置（公司 / 行业 / 宏观）
//!
//! 每种研报类型对应一组数据采集工具、分析工具与输出章节；
//! 调度器在注册 Agent 时按类型收窄其能力集。类型可由自由指令的关键词识别，默认公司研报。

use serde::{Deserialize, Serialize};

/// 研报类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Company,
    Industry,
    Macro,
}

impl ReportType {
    /// 配置字符串映射；未知值按公司研报处理
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_lowercase().as_str() {
            "industry" => ReportType::Industry,
            "macro" => ReportType::Macro,
            _ => ReportType::Company,
        }
    }
}

/// 单个研报类型的静态配置
#[derive(Debug, Clone)]
pub struct ReportTypeSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub data_tools: &'static [&'static str],
    pub analysis_tools: &'static [&'static str],
    pub output_sections: &'static [&'static str],
}

const COMPANY_SPEC: ReportTypeSpec = ReportTypeSpec {
    name: "公司研报",
    description: "针对特定公司的深度分析研报",
    data_tools: &[
        "get_competitor_listed_companies",
        "get_all_financial_data",
        "get_all_company_info",
        "get_shareholder_analysis",
        "get_company_search_info",
    ],
    analysis_tools: &[
        "analyze_companies_in_directory",
        "run_comparison_analysis",
        "merge_reports",
        "evaluation",
        "get_analysis_report",
        "deep_report_generation",
    ],
    output_sections: &["公司概况", "财务分析", "竞争对手分析", "投资建议", "风险提示"],
};

const INDUSTRY_SPEC: ReportTypeSpec = ReportTypeSpec {
    name: "行业研报",
    description: "针对特定行业的全面分析研报",
    data_tools: &[
        "get_industry_overview",
        "get_industry_chain_analysis",
        "get_industry_policy_impact",
        "get_industry_technology_trends",
        "get_industry_association_reports",
        "get_industry_market_scale",
        "get_leading_companies_data",
    ],
    analysis_tools: &[
        "analyze_industry_structure",
        "analyze_industry_trends",
        "analyze_industry_competition",
        "industry_valuation_analysis",
        "industry_risk_assessment",
        "generate_industry_report",
    ],
    output_sections: &[
        "行业概况",
        "产业链分析",
        "市场规模与竞争格局",
        "技术发展趋势",
        "政策环境分析",
        "投资机会与风险",
    ],
};

const MACRO_SPEC: ReportTypeSpec = ReportTypeSpec {
    name: "宏观经济研报",
    description: "宏观经济形势分析与策略研报",
    data_tools: &[
        "get_gdp_data",
        "get_cpi_data",
        "get_interest_rate_data",
        "get_exchange_rate_data",
        "get_federal_reserve_data",
        "get_policy_reports",
        "get_macro_industry_impact",
    ],
    analysis_tools: &[
        "analyze_macro_trends",
        "analyze_policy_impact",
        "analyze_global_influence",
        "macro_forecasting",
        "sector_rotation_analysis",
        "generate_macro_report",
    ],
    output_sections: &[
        "宏观经济概况",
        "货币政策分析",
        "财政政策分析",
        "国际环境影响",
        "行业影响分析",
        "投资策略建议",
    ],
};

/// 研报类型配置管理器
#[derive(Debug, Clone, Default)]
pub struct ReportTypeConfig;

impl ReportTypeConfig {
    pub fn new() -> Self {
        Self
    }

    pub fn get_spec(&self, report_type: ReportType) -> &'static ReportTypeSpec {
        match report_type {
            ReportType::Company => &COMPANY_SPEC,
            ReportType::Industry => &INDUSTRY_SPEC,
            ReportType::Macro => &MACRO_SPEC,
        }
    }

    /// 数据采集工具列表
    pub fn data_tools(&self, report_type: ReportType) -> Vec<String> {
        self.get_spec(report_type)
            .data_tools
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// 分析工具列表
    pub fn analysis_tools(&self, report_type: ReportType) -> Vec<String> {
        self.get_spec(report_type)
            .analysis_tools
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn output_sections(&self, report_type: ReportType) -> Vec<String> {
        self.get_spec(report_type)
            .output_sections
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// 根据自由指令识别研报类型（关键词匹配，默认公司研报）
    pub fn identify_report_type(&self, instruction: &str) -> ReportType {
        const COMPANY_KEYWORDS: &[&str] = &["公司研报", "企业分析", "公司分析", "个股研报"];
        const INDUSTRY_KEYWORDS: &[&str] = &["行业研报", "行业分析", "产业分析", "行业报告"];
        const MACRO_KEYWORDS: &[&str] =
            &["宏观", "经济研报", "策略研报", "宏观分析", "经济分析"];

        if COMPANY_KEYWORDS.iter().any(|k| instruction.contains(k)) {
            ReportType::Company
        } else if INDUSTRY_KEYWORDS.iter().any(|k| instruction.contains(k)) {
            ReportType::Industry
        } else if MACRO_KEYWORDS.iter().any(|k| instruction.contains(k)) {
            ReportType::Macro
        } else {
            ReportType::Company
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifies_report_type_from_instruction() {
        let config = ReportTypeConfig::new();
        assert_eq!(
            config.identify_report_type("请生成商汤科技的公司研报"),
            ReportType::Company
        );
        assert_eq!(
            config.identify_report_type("写一份人工智能行业分析"),
            ReportType::Industry
        );
        assert_eq!(
            config.identify_report_type("本季度宏观经济走势如何"),
            ReportType::Macro
        );
        // 无关键词时默认公司研报
        assert_eq!(config.identify_report_type("随便写点"), ReportType::Company);
    }

    #[test]
    fn company_tools_include_peer_collection() {
        let config = ReportTypeConfig::new();
        let tools = config.data_tools(ReportType::Company);
        assert!(tools.contains(&"get_competitor_listed_companies".to_string()));
        assert_eq!(tools.len(), 5);
        assert_eq!(config.analysis_tools(ReportType::Company).len(), 6);
    }

    #[test]
    fn report_type_from_tag() {
        assert_eq!(ReportType::from_tag("industry"), ReportType::Industry);
        assert_eq!(ReportType::from_tag("MACRO"), ReportType::Macro);
        assert_eq!(ReportType::from_tag("unknown"), ReportType::Company);
    }
}
