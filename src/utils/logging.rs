/// 日志工具模块
///
/// 提供作答会话日志格式化和输出的辅助函数
use tracing::info;

use crate::models::SubmitResult;
use crate::queue::FlushReport;

/// 记录作答开始信息
///
/// # 参数
/// - `exam_id`: 考试ID
/// - `attempt_id`: 作答ID
/// - `question_count`: 题目数量
/// - `remaining_secs`: 剩余秒数
pub fn log_attempt_start(exam_id: &str, attempt_id: &str, question_count: usize, remaining_secs: u64) {
    info!("{}", "=".repeat(60));
    info!("🚀 开始作答 - 考试 {} / 作答 {}", exam_id, attempt_id);
    info!("📋 题目数量: {}", question_count);
    info!("⏱ 剩余时间: {}", format_remaining(remaining_secs));
    info!("{}", "=".repeat(60));
}

/// 记录一次队列刷新的结果
pub fn log_flush_report(attempt_id: &str, report: &FlushReport) {
    info!(
        "[作答 {}] 🔁 队列刷新: 成功 {}/{}，剩余 {}，丢弃 {}",
        attempt_id, report.delivered, report.attempted, report.remaining, report.dropped
    );
}

/// 打印提交结果
pub fn log_submit_result(attempt_id: &str, result: &SubmitResult) {
    info!("\n{}", "=".repeat(60));
    info!("📊 作答 {} 已提交", attempt_id);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    match result.total_score {
        Some(score) => info!("✅ 总分: {}", score),
        None => info!("✅ 总分: 无"),
    }
    let correct = result.per_question.iter().filter(|q| q.correct).count();
    info!("逐题结果: 正确 {}/{}", correct, result.per_question.len());
    if let Some(percentile) = result.percentile {
        info!("百分位: {}", percentile);
    }
    info!("{}", "=".repeat(60));
}

/// 把秒数格式化为 `分:秒`
pub fn format_remaining(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
