//! 医学资料检索

use anyhow::Result;
use reqwest::Url;
use tracing::{info, warn};

use crate::llm::client::utils::truncate_chars;
use crate::models::schemas::{ResearchRequest, ResearchResponse, ResearchResult};
use crate::services::{MedicalLanguageModel, SearchHit, SearchQuery, WebSearch};

const DESCRIPTION_MAX_CHARS: usize = 400;

/// 常见医学站点与展示名称，按匹配顺序排列（子域名在前）
const KNOWN_SOURCES: &[(&str, &str)] = &[
    ("pubmed.ncbi.nlm.nih.gov", "PubMed"),
    ("ncbi.nlm.nih.gov", "NCBI"),
    ("medlineplus.gov", "MedlinePlus"),
    ("nih.gov", "NIH"),
    ("cdc.gov", "CDC"),
    ("who.int", "WHO"),
    ("mayoclinic.org", "Mayo Clinic"),
    ("clevelandclinic.org", "Cleveland Clinic"),
    ("nhs.uk", "NHS"),
    ("pasteur.fr", "Institut Pasteur"),
    ("has-sante.fr", "HAS"),
    ("ameli.fr", "Ameli"),
    ("inserm.fr", "Inserm"),
    ("vidal.fr", "Vidal"),
];

/// 根据URL得出来源名称
pub fn source_name(url: &str) -> String {
    let Some(host) = Url::parse(url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_lowercase))
    else {
        return "Web".to_string();
    };
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    KNOWN_SOURCES
        .iter()
        .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{}", domain)))
        .map(|(_, name)| name.to_string())
        .unwrap_or(host)
}

/// 将检索命中转换为接口结果
pub fn to_research_result(hit: SearchHit) -> ResearchResult {
    let (mut description, truncated) = truncate_chars(hit.content.trim(), DESCRIPTION_MAX_CHARS);
    if truncated {
        description.push('…');
    }
    let title = if hit.title.trim().is_empty() {
        hit.url.clone()
    } else {
        hit.title.trim().to_string()
    };

    ResearchResult {
        source: source_name(&hit.url),
        title,
        description,
        url: hit.url,
        score: hit.score,
        ai_summary: None,
    }
}

fn summary_system_prompt(request: &ResearchRequest) -> String {
    format!(
        "You are a medical research assistant. Summarize what the search results below say \
         about the user's question in 3 to 5 sentences. Only use the information in the results, \
         do not make a diagnosis, and mention when the evidence is limited. {}",
        request.language().prompt_instruction()
    )
}

fn summary_prompt(query: &str, results: &[ResearchResult]) -> String {
    let mut prompt = format!("Question: {}\n\nSearch results:\n", query);
    for (index, result) in results.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} ({})\n{}\n\n",
            index + 1,
            result.title,
            result.source,
            result.description
        ));
    }
    prompt
}

/// 检索医学资料，第一条结果附带AI摘要
pub async fn search_medical_research(
    llm: &dyn MedicalLanguageModel,
    search: &dyn WebSearch,
    request: &ResearchRequest,
    default_max_results: usize,
) -> Result<ResearchResponse> {
    request.validate()?;
    let query = request.query.trim();
    let max_results = request.effective_max_results(default_max_results);

    let outcome = search.search(&SearchQuery::new(query, max_results)).await?;
    let mut results: Vec<ResearchResult> = outcome
        .hits
        .into_iter()
        .take(max_results)
        .map(to_research_result)
        .collect();

    if !results.is_empty() {
        let ai_summary = match outcome.answer {
            Some(answer) => Some(answer),
            None if llm.is_configured() => {
                match llm
                    .complete(&summary_system_prompt(request), &summary_prompt(query, &results))
                    .await
                {
                    Ok(summary) if !summary.trim().is_empty() => Some(summary.trim().to_string()),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(error = %e, "research summary failed, returning results without it");
                        None
                    }
                }
            }
            None => None,
        };
        results[0].ai_summary = ai_summary;
    }

    info!(query, results = results.len(), "research completed");
    Ok(ResearchResponse {
        query: query.to_string(),
        total: results.len(),
        results,
        language: request.language(),
    })
}
