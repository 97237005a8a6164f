use axum::{
    Json,
    extract::{Multipart, State, rejection::JsonRejection},
};
use medicare_ai::context::AppContext;
use medicare_ai::i18n::Language;
use medicare_ai::{
    AnalysisRequest, AnalysisResponse, ImageAnalysisResponse, analyze_medical_record,
};
use tracing::info;

use super::{ApiError, with_timeout};

/// multipart上传的文件与附带字段
struct Upload {
    data: Vec<u8>,
    mime_type: String,
    language: Language,
    include_research: bool,
}

/// 根据文件扩展名推断类型，客户端未提供Content-Type时使用
fn guess_mime(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

async fn read_multipart(context: &AppContext, mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut file = None;
    let mut language = context.settings().default_language;
    let mut include_research = true;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let declared = field
                    .content_type()
                    .filter(|mime| *mime != "application/octet-stream")
                    .map(str::to_string);
                let mime_type = declared.unwrap_or_else(|| {
                    guess_mime(field.file_name().unwrap_or_default()).to_string()
                });
                let data = field.bytes().await?;
                file = Some((data.to_vec(), mime_type));
            }
            "language" => {
                let value = field.text().await?;
                language = value
                    .parse()
                    .map_err(|e: String| ApiError::bad_request(e))?;
            }
            "includeResearch" => {
                include_research = field.text().await?.trim() != "false";
            }
            _ => {}
        }
    }

    let (data, mime_type) =
        file.ok_or_else(|| ApiError::bad_request("multipart field 'file' is required"))?;
    Ok(Upload {
        data,
        mime_type,
        language,
        include_research,
    })
}

/// POST /analyze
pub async fn analyze_upload(
    State(context): State<AppContext>,
    multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let upload = read_multipart(&context, multipart).await?;
    info!(mime = %upload.mime_type, bytes = upload.data.len(), "analyzing uploaded record");

    let chain = context.analysis_chain();
    let response = with_timeout(&context, async {
        let document = chain
            .read_upload(&upload.data, &upload.mime_type, upload.language)
            .await?;
        let mut request = AnalysisRequest::new(document.analysis_text(), upload.language);
        request.include_research = upload.include_research;
        analyze_medical_record(chain, &request).await
    })
    .await?;
    Ok(Json(response))
}

/// POST /analyze/text
pub async fn analyze_text(
    State(context): State<AppContext>,
    body: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(mut request) = body?;
    request
        .language
        .get_or_insert(context.settings().default_language);
    let response = with_timeout(
        &context,
        analyze_medical_record(context.analysis_chain(), &request),
    )
    .await?;
    Ok(Json(response))
}

/// POST /analyze/image
pub async fn analyze_image(
    State(context): State<AppContext>,
    multipart: Multipart,
) -> Result<Json<ImageAnalysisResponse>, ApiError> {
    let upload = read_multipart(&context, multipart).await?;
    let document = with_timeout(
        &context,
        context
            .analysis_chain()
            .read_upload(&upload.data, &upload.mime_type, upload.language),
    )
    .await?;
    Ok(Json(document))
}
