use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use pipeline_core::{PipelineError, PipelineResult};
use pipeline_domain::entities::EngineeredFeatures;
use pipeline_domain::services::CleaningService;

/// 视为缺失值的占位字符串
const PROBLEMATIC_VALUES: [&str; 9] = [
    "nan", "inf", "-inf", "infinity", "-infinity", "na", "n/a", "none", "null",
];

/// 自雇关键词
const SELF_EMPLOYED_KEYWORDS: [&str; 11] = [
    "self-employed",
    "self employed",
    "owner",
    "freelance",
    "sole proprietor",
    "entrepreneur",
    "selfemployee",
    "selfemployer",
    "self-contract",
    "self emploed",
    "self emplyed",
];

fn is_problematic(s: &str) -> bool {
    s.is_empty() || PROBLEMATIC_VALUES.contains(&s.to_lowercase().as_str())
}

/// 提取字符串中第一段连续数字
fn first_digit_run(s: &str) -> Option<i64> {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// 宽松的浮点解析；NaN/Inf/占位串一律视为缺失
fn robust_float(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let cleaned = s.trim();
            if is_problematic(cleaned) {
                return None;
            }
            cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// 百分比解析：13.5 或 "13.5%" → 0.135
fn parse_percentage(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(|f| f / 100.0),
        Value::String(s) => {
            let cleaned = s.replace('%', "");
            let cleaned = cleaned.trim();
            if is_problematic(cleaned) {
                return None;
            }
            cleaned
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f / 100.0)
        }
        _ => None,
    }
}

/// 期限解析："36 months" 或 36 → 36
fn parse_term(value: Option<&Value>) -> Option<i32> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(|f| f as i32),
        Value::String(s) => first_digit_run(s).map(|n| n as i32),
        _ => None,
    }
}

/// 工作年限解析："10+ years" → 10，"< 1 year" → 0
fn parse_emp_length(value: Option<&Value>) -> Option<i32> {
    let s = value?.as_str()?;
    let lower = s.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    if lower.contains("< 1 year") || lower.contains("<1 year") {
        return Some(0);
    }
    if lower.contains("10+ years") {
        return Some(10);
    }
    first_digit_run(&lower).map(|n| n as i32)
}

/// 州代码：两位大写字符串，无效时落回默认值
fn parse_state_code(value: Option<&Value>, default_code: &str) -> String {
    match value {
        Some(Value::String(s)) => {
            let processed = s.trim().to_uppercase();
            if is_problematic(&processed) {
                return default_code.to_string();
            }
            processed.chars().take(2).collect()
        }
        _ => default_code.to_string(),
    }
}

fn is_self_employed_from_title(value: Option<&Value>) -> bool {
    let Some(title) = value.and_then(|v| v.as_str()) else {
        return false;
    };
    if title.trim().is_empty() {
        return false;
    }
    let lower = title.to_lowercase();
    SELF_EMPLOYED_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// 从 "Mon-YYYY"（或全月名）格式中提取月份 1-12
fn month_from_issue_date(value: Option<&Value>) -> Option<i32> {
    let s = value?.as_str()?.trim();
    if is_problematic(s) {
        return None;
    }
    let (month_part, year_part) = s.split_once('-')?;
    year_part.trim().parse::<i32>().ok()?;

    let prefix: String = month_part.trim().to_lowercase().chars().take(3).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// 带日志的字段解析，失败时落回默认值
fn parse_with_default<T, F>(raw: Option<&Value>, parser: F, field: &str, default: T) -> T
where
    T: Copy + std::fmt::Debug,
    F: Fn(Option<&Value>) -> Option<T>,
{
    if raw.is_none() {
        return default;
    }
    match parser(raw) {
        Some(parsed) => parsed,
        None => {
            warn!(field, raw = ?raw, default = ?default, "字段解析失败，使用默认值");
            default
        }
    }
}

/// 进程内的清洗与特征工程服务
///
/// 对原始申请做逐字段的宽松解析，缺失或无法解析的字段落回
/// 默认值，再派生评分模型需要的组合特征。
pub struct FeatureEngineeringService;

impl FeatureEngineeringService {
    pub fn new() -> Self {
        Self
    }

    fn engineer(&self, raw: &serde_json::Map<String, Value>) -> EngineeredFeatures {
        let mut loan_amnt = parse_with_default(raw.get("loan_amnt"), robust_float, "loan_amnt", 0.0);
        let term = parse_with_default(raw.get("term"), parse_term, "term", 36);
        let int_rate = parse_with_default(raw.get("int_rate"), parse_percentage, "int_rate", 0.0);
        let installment =
            parse_with_default(raw.get("installment"), robust_float, "installment", 0.0);
        let emp_length =
            parse_with_default(raw.get("emp_length"), parse_emp_length, "emp_length", 0);
        let mut annual_inc =
            parse_with_default(raw.get("annual_inc"), robust_float, "annual_inc", 0.0);
        let dti = parse_with_default(raw.get("dti"), parse_percentage, "dti", 0.0);

        if loan_amnt < 0.0 {
            warn!(loan_amnt, "贷款金额为负，重置为 0.0");
            loan_amnt = 0.0;
        }
        // 年收入必须为正才能算比率
        if annual_inc <= 0.0 {
            debug!(annual_inc, "年收入非正，重置为 1.0 以便计算比率");
            annual_inc = 1.0;
        }

        let addr_state = parse_state_code(raw.get("addr_state"), "XX");
        let credit_to_income_ratio = round4(loan_amnt / annual_inc);
        let is_self_employed = is_self_employed_from_title(raw.get("emp_title"));
        let loan_month = month_from_issue_date(raw.get("issue_d")).unwrap_or_else(|| {
            if raw.get("issue_d").is_some() {
                warn!(issue_d = ?raw.get("issue_d"), "放款日期解析失败，月份使用默认值 0");
            }
            0
        });
        let is_long_term = term >= 36;

        EngineeredFeatures {
            loan_amnt,
            term,
            int_rate: round4(int_rate),
            installment,
            emp_length,
            annual_inc,
            dti: round4(dti),
            addr_state,
            credit_to_income_ratio,
            is_self_employed,
            loan_month,
            is_long_term,
        }
    }
}

impl Default for FeatureEngineeringService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CleaningService for FeatureEngineeringService {
    async fn clean(&self, payload: &Value) -> PipelineResult<EngineeredFeatures> {
        let raw = payload
            .as_object()
            .filter(|obj| !obj.is_empty())
            .ok_or_else(|| {
                PipelineError::validation_error("原始申请载荷缺失、不是对象或为空")
            })?;

        Ok(self.engineer(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_clean_happy_path() {
        let service = FeatureEngineeringService::new();
        let payload = json!({
            "loan_amnt": "10000",
            "term": "36 months",
            "int_rate": "13.5%",
            "installment": 339.25,
            "emp_length": "10+ years",
            "annual_inc": 55000,
            "dti": 18.2,
            "addr_state": "ca",
            "emp_title": "Business Owner",
            "issue_d": "Dec-2018"
        });

        let features = service.clean(&payload).await.unwrap();
        assert_eq!(features.loan_amnt, 10000.0);
        assert_eq!(features.term, 36);
        assert_eq!(features.int_rate, 0.135);
        assert_eq!(features.installment, 339.25);
        assert_eq!(features.emp_length, 10);
        assert_eq!(features.annual_inc, 55000.0);
        assert_eq!(features.dti, 0.182);
        assert_eq!(features.addr_state, "CA");
        assert_eq!(features.credit_to_income_ratio, 0.1818);
        assert!(features.is_self_employed);
        assert_eq!(features.loan_month, 12);
        assert!(features.is_long_term);
    }

    #[tokio::test]
    async fn test_clean_empty_payload_is_validation_error() {
        let service = FeatureEngineeringService::new();

        let err = service.clean(&json!({})).await.unwrap_err();
        assert!(err.is_validation());

        let err = service.clean(&json!("not an object")).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_clean_applies_defaults_for_missing_fields() {
        let service = FeatureEngineeringService::new();
        let features = service.clean(&json!({"loan_amnt": 5000})).await.unwrap();

        assert_eq!(features.loan_amnt, 5000.0);
        assert_eq!(features.term, 36);
        assert_eq!(features.int_rate, 0.0);
        assert_eq!(features.emp_length, 0);
        // annual_inc 缺失 → 默认0 → 重置为1.0
        assert_eq!(features.annual_inc, 1.0);
        assert_eq!(features.addr_state, "XX");
        assert_eq!(features.loan_month, 0);
        assert!(!features.is_self_employed);
        assert_eq!(features.credit_to_income_ratio, 5000.0);
    }

    #[tokio::test]
    async fn test_clean_clamps_negative_loan_amount() {
        let service = FeatureEngineeringService::new();
        let features = service
            .clean(&json!({"loan_amnt": -500, "annual_inc": 10000}))
            .await
            .unwrap();
        assert_eq!(features.loan_amnt, 0.0);
        assert_eq!(features.credit_to_income_ratio, 0.0);
    }

    #[test]
    fn test_robust_float_rejects_placeholders() {
        for bad in ["NaN", "inf", "n/a", "None", "null", ""] {
            assert_eq!(robust_float(Some(&json!(bad))), None, "value: {bad}");
        }
        assert_eq!(robust_float(Some(&json!("  123.5 "))), Some(123.5));
        assert_eq!(robust_float(Some(&json!(42))), Some(42.0));
        assert_eq!(robust_float(Some(&json!(true))), None);
        assert_eq!(robust_float(None), None);
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_percentage(Some(&json!(13.5))), Some(0.135));
        assert_eq!(parse_percentage(Some(&json!("13.5%"))), Some(0.135));
        assert_eq!(parse_percentage(Some(&json!(" 7 "))), Some(0.07));
        assert_eq!(parse_percentage(Some(&json!("nan"))), None);
    }

    #[test]
    fn test_parse_term() {
        assert_eq!(parse_term(Some(&json!("36 months"))), Some(36));
        assert_eq!(parse_term(Some(&json!("60 months"))), Some(60));
        assert_eq!(parse_term(Some(&json!(36))), Some(36));
        assert_eq!(parse_term(Some(&json!("months"))), None);
    }

    #[test]
    fn test_parse_emp_length() {
        assert_eq!(parse_emp_length(Some(&json!("10+ years"))), Some(10));
        assert_eq!(parse_emp_length(Some(&json!("< 1 year"))), Some(0));
        assert_eq!(parse_emp_length(Some(&json!("<1 year"))), Some(0));
        assert_eq!(parse_emp_length(Some(&json!("5 years"))), Some(5));
        assert_eq!(parse_emp_length(Some(&json!(5))), None);
        assert_eq!(parse_emp_length(Some(&json!(""))), None);
    }

    #[test]
    fn test_parse_state_code() {
        assert_eq!(parse_state_code(Some(&json!(" ca ")), "XX"), "CA");
        assert_eq!(parse_state_code(Some(&json!("California")), "XX"), "CA");
        assert_eq!(parse_state_code(Some(&json!("n/a")), "XX"), "XX");
        assert_eq!(parse_state_code(Some(&json!(12)), "XX"), "XX");
        assert_eq!(parse_state_code(None, "XX"), "XX");
    }

    #[test]
    fn test_month_from_issue_date() {
        assert_eq!(month_from_issue_date(Some(&json!("Dec-2018"))), Some(12));
        assert_eq!(month_from_issue_date(Some(&json!("December-2018"))), Some(12));
        assert_eq!(month_from_issue_date(Some(&json!("jan-2020"))), Some(1));
        assert_eq!(month_from_issue_date(Some(&json!("2018-12"))), None);
        assert_eq!(month_from_issue_date(Some(&json!("Dec-abcd"))), None);
        assert_eq!(month_from_issue_date(Some(&json!("nan"))), None);
    }

    #[test]
    fn test_is_self_employed() {
        assert!(is_self_employed_from_title(Some(&json!("Sole Proprietor"))));
        assert!(is_self_employed_from_title(Some(&json!("freelance designer"))));
        assert!(!is_self_employed_from_title(Some(&json!("Teacher"))));
        assert!(!is_self_employed_from_title(Some(&json!(""))));
        assert!(!is_self_employed_from_title(None));
    }
}
