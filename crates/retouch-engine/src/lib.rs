use std::env;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{imageops, DynamicImage, GrayImage, ImageFormat, RgbaImage};
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use tracing::{debug, info};

use retouch_contracts::error::{Result, RetouchError};
use retouch_contracts::options::{
    validate_result_count, EditOptions, FocusMode, GenerateOptions, SegmentationMode,
    VariationOptions,
};
use retouch_contracts::sizing::TargetSize;
use retouch_contracts::workspace::{ImageWorkspace, OutputKind};

const SEGMENT_API_VERSION: &str = "2023-02-01-preview";
const DEFAULT_IMAGE_API_BASE: &str = "https://api.openai.com/v1";

/// Credentials for the remote vision service (smart crop + segmentation).
///
/// Loaded once at process start and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub endpoint: String,
    pub key: String,
}

impl VisionConfig {
    pub fn from_env() -> Result<Self> {
        let endpoint = non_empty_env("AZURE_COMPUTER_VISION_ENDPOINT").ok_or_else(|| {
            RetouchError::input("AZURE_COMPUTER_VISION_ENDPOINT is not set")
        })?;
        let key = non_empty_env("AZURE_COMPUTER_VISION_KEY")
            .ok_or_else(|| RetouchError::input("AZURE_COMPUTER_VISION_KEY is not set"))?;
        Ok(Self { endpoint, key })
    }
}

/// Credentials and base URL for the generative image API.
#[derive(Debug, Clone)]
pub struct ImageApiConfig {
    pub api_base: String,
    pub api_key: String,
}

impl ImageApiConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = non_empty_env("OPEN_AI_KEY")
            .or_else(|| non_empty_env("OPENAI_API_KEY"))
            .ok_or_else(|| RetouchError::input("OPEN_AI_KEY is not set"))?;
        let api_base = non_empty_env("OPENAI_API_BASE")
            .unwrap_or_else(|| DEFAULT_IMAGE_API_BASE.to_string());
        Ok(Self { api_base, api_key })
    }
}

/// Blocking client for the smart-thumbnail and segmentation endpoints.
pub struct VisionClient {
    endpoint: String,
    key: String,
    http: HttpClient,
}

impl VisionClient {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            endpoint: trim_base(&config.endpoint),
            key: config.key,
            http: HttpClient::new(),
        }
    }

    /// Request a subject-centered square thumbnail, `size` pixels per edge.
    ///
    /// The service chooses the crop window around the detected subject; the
    /// response is re-encoded to PNG whatever format it arrives in.
    pub fn smart_thumbnail(&self, image_bytes: &[u8], size: TargetSize) -> Result<Vec<u8>> {
        let pixels = size.pixels();
        let url = format!(
            "{}/vision/v3.2/generateThumbnail?overload=stream&width={pixels}&height={pixels}",
            self.endpoint
        );
        info!(width = pixels, height = pixels, "requesting smart-cropped thumbnail");
        let body = self.post_image_bytes(&url, image_bytes)?;
        let decoded = image::load_from_memory(&body).map_err(|err| {
            RetouchError::segmentation(format!("thumbnail response is not an image: {err}"))
        })?;
        encode_png(&decoded)
    }

    /// Request a segmentation of `image_bytes` under an explicit mode.
    ///
    /// The response bytes are returned verbatim: a cutout for background
    /// removal, a grayscale confidence matte for foreground matting.
    pub fn segment(&self, image_bytes: &[u8], mode: SegmentationMode) -> Result<Vec<u8>> {
        let url = format!(
            "{}/computervision/imageanalysis:segment?api-version={SEGMENT_API_VERSION}&mode={}",
            self.endpoint,
            mode.as_query_value()
        );
        info!(mode = mode.as_query_value(), "requesting segmentation");
        self.post_image_bytes(&url, image_bytes)
    }

    fn post_image_bytes(&self, url: &str, body: &[u8]) -> Result<Vec<u8>> {
        let response = self
            .http
            .post(url)
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body.to_vec())
            .send()
            .map_err(|err| RetouchError::segmentation(format!("vision request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body = response.text().unwrap_or_default();
            return Err(RetouchError::segmentation(format!(
                "vision request failed ({code}): {}",
                truncate_text(&body, 512)
            )));
        }
        let bytes = response.bytes().map_err(|err| {
            RetouchError::segmentation(format!("vision response read failed: {err}"))
        })?;
        Ok(bytes.to_vec())
    }
}

/// Blocking client for the OpenAI-compatible image endpoints.
pub struct ImageApiClient {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl ImageApiClient {
    pub fn new(config: ImageApiConfig) -> Self {
        Self {
            api_base: trim_base(&config.api_base),
            api_key: config.api_key,
            http: HttpClient::new(),
        }
    }

    /// Submit an edit request; returns the decoded artifact payloads in
    /// response order.
    pub fn edit(
        &self,
        thumbnail_png: &[u8],
        mask_png: &[u8],
        prompt: &str,
        size: TargetSize,
        count: u32,
    ) -> Result<Vec<Vec<u8>>> {
        let endpoint = format!("{}/images/edits", self.api_base);
        let form = MultipartForm::new()
            .text("prompt", prompt.to_string())
            .text("n", count.to_string())
            .text("size", size.token())
            .text("response_format", "b64_json")
            .part("image", png_part(thumbnail_png.to_vec(), "smartCropped.png")?)
            .part("mask", png_part(mask_png.to_vec(), "mask.png")?);
        info!(size = size.token(), count, "submitting edit request");
        let payload = self.send_multipart(&endpoint, form)?;
        extract_image_payloads(&payload)
    }

    /// Submit a pure text-to-image generation request.
    pub fn generate(&self, prompt: &str, count: u32) -> Result<Vec<Vec<u8>>> {
        let endpoint = format!("{}/images/generations", self.api_base);
        let payload = json!({
            "prompt": prompt,
            "n": count,
            "response_format": "b64_json",
        });
        info!(count, "submitting generation request");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(|err| RetouchError::edit_api(format!("generation request failed: {err}")))?;
        let parsed = json_response("generation", response)?;
        extract_image_payloads(&parsed)
    }

    /// Request variations of an existing PNG image.
    pub fn variation(&self, source_png: &[u8], size: TargetSize, count: u32) -> Result<Vec<Vec<u8>>> {
        let endpoint = format!("{}/images/variations", self.api_base);
        let form = MultipartForm::new()
            .text("n", count.to_string())
            .text("size", size.token())
            .text("response_format", "b64_json")
            .part("image", png_part(source_png.to_vec(), "original.png")?);
        info!(size = size.token(), count, "submitting variation request");
        let payload = self.send_multipart(&endpoint, form)?;
        extract_image_payloads(&payload)
    }

    fn send_multipart(&self, endpoint: &str, form: MultipartForm) -> Result<Value> {
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|err| RetouchError::edit_api(format!("image request failed: {err}")))?;
        json_response("image", response)
    }
}

/// Sequences the pipeline stages over one working directory.
///
/// Fully sequential and synchronous: each stage blocks until the previous
/// stage's network call and local transform complete.
pub struct RetouchEngine {
    workspace: ImageWorkspace,
    images: ImageApiClient,
    vision: Option<VisionClient>,
}

impl RetouchEngine {
    pub fn new(workspace: ImageWorkspace, images: ImageApiClient) -> Self {
        Self {
            workspace,
            images,
            vision: None,
        }
    }

    /// Attach the vision client the edit pipeline needs for cropping and
    /// segmentation. Generation and variation run without one.
    pub fn with_vision(mut self, vision: VisionClient) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn workspace(&self) -> &ImageWorkspace {
        &self.workspace
    }

    /// Run the full edit pipeline: crop, segment, mask, edit, persist.
    ///
    /// Returns the persisted artifact paths in response order. Intermediate
    /// files written before a failure are left on disk for inspection.
    pub fn edit(&self, options: &EditOptions) -> Result<Vec<PathBuf>> {
        let count = validate_result_count(options.count)?;
        let (source, source_bytes) = load_source(&options.source)?;
        let size = TargetSize::for_dimensions(source.width(), source.height());
        info!(
            width = source.width(),
            height = source.height(),
            target = size.token(),
            "selected target size"
        );

        let vision = self
            .vision
            .as_ref()
            .ok_or_else(|| RetouchError::input("vision service is not configured"))?;

        let thumbnail = vision.smart_thumbnail(&source_bytes, size)?;
        fs::write(self.workspace.thumbnail(), &thumbnail)?;
        debug!(path = %self.workspace.thumbnail().display(), "thumbnail saved");

        let segmented = vision.segment(&thumbnail, options.focus.segmentation_mode())?;
        fs::write(self.workspace.segmentation(), &segmented)?;
        debug!(path = %self.workspace.segmentation().display(), "segmentation saved");

        let mask = match options.focus {
            FocusMode::Foreground => self.build_mask(&segmented)?,
            // The background-removal cutout already carries alpha; it goes
            // to the edit API as the mask without the invert step.
            FocusMode::Background => segmented,
        };

        let payloads = self
            .images
            .edit(&thumbnail, &mask, &options.prompt, size, count)?;
        let saved = self.persist_payloads(OutputKind::Edit, &payloads)?;

        save_png(&source, &self.workspace.original())?;
        Ok(saved)
    }

    /// Generate images from a prompt alone; no mask pipeline involved.
    pub fn generate(&self, options: &GenerateOptions) -> Result<Vec<PathBuf>> {
        let count = validate_result_count(options.count)?;
        let payloads = self.images.generate(&options.prompt, count)?;
        self.persist_payloads(OutputKind::Generated, &payloads)
    }

    /// Create variations of the source image at its natural size class.
    pub fn variation(&self, options: &VariationOptions) -> Result<Vec<PathBuf>> {
        let count = validate_result_count(options.count)?;
        let (source, _) = load_source(&options.source)?;
        let size = TargetSize::for_dimensions(source.width(), source.height());
        info!(target = size.token(), "selected variation size");

        // The variations endpoint only takes PNG; re-encode whatever format
        // the caller supplied instead of overwriting their file.
        let png = encode_png(&source)?;
        let payloads = self.images.variation(&png, size, count)?;
        self.persist_payloads(OutputKind::Variant, &payloads)
    }

    /// Convert the foreground matte into the transparency mask the edit API
    /// expects, persisting the inverted intermediate and the final mask.
    fn build_mask(&self, segmented: &[u8]) -> Result<Vec<u8>> {
        let matte = image::load_from_memory(segmented)
            .map_err(|err| {
                RetouchError::segmentation(format!("matte is not a decodable image: {err}"))
            })?
            .into_luma8();

        let mut inverted = matte;
        imageops::invert(&mut inverted);
        let inverted_path = self.workspace.inverted_matte();
        inverted.save(&inverted_path).map_err(|err| {
            RetouchError::persistence(format!("failed to write {}: {err}", inverted_path.display()))
        })?;

        let mask = mask_from_inverted_matte(&inverted);
        let mask_png = encode_png(&DynamicImage::ImageRgba8(mask))?;
        fs::write(self.workspace.mask(), &mask_png)?;
        debug!(path = %self.workspace.mask().display(), "mask saved");
        Ok(mask_png)
    }

    fn persist_payloads(&self, kind: OutputKind, payloads: &[Vec<u8>]) -> Result<Vec<PathBuf>> {
        let mut saved = Vec::with_capacity(payloads.len());
        for (idx, payload) in payloads.iter().enumerate() {
            let path = self.workspace.output(kind, idx + 1)?;
            fs::write(&path, payload)?;
            info!(path = %path.display(), "artifact saved");
            saved.push(path);
        }
        Ok(saved)
    }
}

/// Build the RGBA edit mask from an inverted foreground matte.
///
/// Pointwise over the raw buffers: inverted value 255 (fully background in
/// the original matte) becomes opaque white; every other pixel becomes
/// black with alpha equal to the inverted value, leaving foreground and
/// uncertain areas editable.
pub fn mask_from_inverted_matte(inverted: &GrayImage) -> RgbaImage {
    let (width, height) = inverted.dimensions();
    let mut mask = RgbaImage::new(width, height);
    for (pixel, &value) in mask.chunks_exact_mut(4).zip(inverted.as_raw().iter()) {
        if value == 255 {
            pixel.copy_from_slice(&[255, 255, 255, 255]);
        } else {
            // RGB stays zeroed; only the alpha carries the matte value.
            pixel[3] = value;
        }
    }
    mask
}

fn load_source(path: &std::path::Path) -> Result<(DynamicImage, Vec<u8>)> {
    let bytes = fs::read(path).map_err(|err| {
        RetouchError::input(format!("cannot read source image {}: {err}", path.display()))
    })?;
    let decoded = image::load_from_memory(&bytes).map_err(|err| {
        RetouchError::input(format!(
            "source {} is not a decodable image: {err}",
            path.display()
        ))
    })?;
    Ok((decoded, bytes))
}

fn save_png(image: &DynamicImage, path: &std::path::Path) -> Result<()> {
    image.save_with_format(path, ImageFormat::Png).map_err(|err| {
        RetouchError::persistence(format!("failed to write {}: {err}", path.display()))
    })
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| RetouchError::persistence(format!("PNG encode failed: {err}")))?;
    Ok(bytes)
}

fn png_part(bytes: Vec<u8>, file_name: &str) -> Result<MultipartPart> {
    MultipartPart::bytes(bytes)
        .file_name(file_name.to_string())
        .mime_str("image/png")
        .map_err(|err| RetouchError::edit_api(format!("invalid mime for {file_name}: {err}")))
}

fn json_response(what: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| {
        RetouchError::edit_api(format!("{what} response body read failed: {err}"))
    })?;
    if !status.is_success() {
        return Err(RetouchError::edit_api(format!(
            "{what} request failed ({code}): {}",
            truncate_text(&body, 512)
        )));
    }
    serde_json::from_str(&body)
        .map_err(|err| RetouchError::edit_api(format!("{what} returned invalid JSON: {err}")))
}

/// Decode the ordered `data[].b64_json` payload list of an images response.
fn extract_image_payloads(payload: &Value) -> Result<Vec<Vec<u8>>> {
    let rows = payload
        .get("data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::new();
    for row in rows {
        let Some(b64) = row.get("b64_json").and_then(Value::as_str) else {
            debug!("skipping response row without b64_json");
            continue;
        };
        let bytes = BASE64
            .decode(b64.as_bytes())
            .map_err(|err| RetouchError::edit_api(format!("image base64 decode failed: {err}")))?;
        out.push(bytes);
    }
    if out.is_empty() {
        return Err(RetouchError::edit_api("response returned no images"));
    }
    Ok(out)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn trim_base(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
