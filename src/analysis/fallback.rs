//! 本地降级载荷：未配置远端或远端不可用时使用的确定性分析结果

use crate::analysis::types::{AnalysisResult, Clause, ClauseRegion, KeyDate, Signature};

/// 生成确定性的本地结果（2 个参与方、3 条条款、2 个签名）
pub fn fallback_result() -> AnalysisResult {
    AnalysisResult {
        parties: vec![
            "Acme Corporation".to_string(),
            "Globex Industries LLC".to_string(),
        ],
        key_dates: vec![
            KeyDate {
                description: "Agreement effective date".to_string(),
                date: "2024-01-15".to_string(),
            },
            KeyDate {
                description: "Initial term ends".to_string(),
                date: "2026-01-14".to_string(),
            },
            KeyDate {
                description: "Renewal notice deadline".to_string(),
                date: "2025-11-15".to_string(),
            },
        ],
        clauses: vec![
            Clause {
                id: "clause-1".to_string(),
                title: "Confidentiality".to_string(),
                content: "Each party shall keep the other party's confidential information \
                          strictly confidential and shall not disclose it to any third party \
                          without prior written consent."
                    .to_string(),
                page: 1,
                position: ClauseRegion::new(10.0, 30.0, 80.0, 15.0),
            },
            Clause {
                id: "clause-2".to_string(),
                title: "Termination".to_string(),
                content: "Either party may terminate this agreement with thirty (30) days \
                          written notice if the other party materially breaches its obligations."
                    .to_string(),
                page: 2,
                position: ClauseRegion::new(10.0, 45.0, 80.0, 12.0),
            },
            Clause {
                id: "clause-3".to_string(),
                title: "Limitation of Liability".to_string(),
                content: "Neither party shall be liable for indirect, incidental or \
                          consequential damages arising out of this agreement."
                    .to_string(),
                page: 3,
                position: ClauseRegion::new(10.0, 20.0, 80.0, 18.0),
            },
        ],
        signatures: vec![
            Signature {
                name: "John Smith".to_string(),
                role: "Chief Executive Officer, Acme Corporation".to_string(),
                page: 4,
            },
            Signature {
                name: "Jane Doe".to_string(),
                role: "General Counsel, Globex Industries LLC".to_string(),
                page: 4,
            },
        ],
        summary: "Services agreement between Acme Corporation and Globex Industries LLC \
                  with a two-year initial term, mutual confidentiality obligations, \
                  termination on thirty days notice for material breach and a cap on \
                  consequential damages."
            .to_string(),
    }
}
