// pair-core/src/tokens.rs

//! Token counts and dollar prices for requests and responses.

use crate::errors::{PairError, Result};
use crate::models::chat::{ChatMessage, ContentPart, ImageDetail, MessageContent};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::{debug, trace};

/// Tokens added for the role line of every message.
pub const MESSAGE_OVERHEAD: usize = 4;
/// Tokens the provider adds to prime every request.
pub const REQUEST_OVERHEAD: usize = 2;
/// Flat cost of a low-detail image.
pub const LOW_DETAIL_IMAGE_TOKENS: usize = 85;

const IMAGE_BASE_TOKENS: usize = 85;
const IMAGE_TILE_TOKENS: usize = 170;
const IMAGE_MAX_SIDE: f64 = 2048.0;
const IMAGE_SHORT_SIDE: f64 = 768.0;
const IMAGE_TILE_SIDE: f64 = 512.0;

/// Dollar rates per 1000 tokens for one model.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Rates {
    pub input: f64,
    pub output: f64,
}

/// Static mapping from model identifier to its rates.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    rates: HashMap<String, Rates>,
}

impl Default for RateTable {
    fn default() -> Self {
        let mut rates = HashMap::new();
        let cheap = Rates { input: 0.002, output: 0.002 };
        let turbo = Rates { input: 0.01, output: 0.03 };
        rates.insert("gpt-3.5-turbo".to_string(), cheap);
        rates.insert("gpt-3.5".to_string(), cheap);
        rates.insert("gpt-4".to_string(), Rates { input: 0.03, output: 0.06 });
        rates.insert("gpt-4-1106-preview".to_string(), turbo);
        rates.insert("gpt-4-turbo-2024-04-09".to_string(), turbo);
        Self { rates }
    }
}

impl RateTable {
    pub fn empty() -> Self {
        Self {
            rates: HashMap::new(),
        }
    }

    pub fn insert(&mut self, model: impl Into<String>, rates: Rates) {
        self.rates.insert(model.into(), rates);
    }

    pub fn get(&self, model: &str) -> Result<Rates> {
        self.rates
            .get(model)
            .copied()
            .ok_or_else(|| PairError::UnsupportedModel(model.to_string()))
    }

    pub fn contains(&self, model: &str) -> bool {
        self.rates.contains_key(model)
    }
}

/// Counts tokens with the `cl100k_base` encoding and prices them from a [`RateTable`].
#[derive(Clone)]
pub struct TokenAccountant {
    bpe: Arc<CoreBPE>,
    rates: RateTable,
}

impl std::fmt::Debug for TokenAccountant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAccountant")
            .field("rates", &self.rates)
            .finish_non_exhaustive()
    }
}

impl TokenAccountant {
    /// Loads the tokenizer. This parses the encoding tables, so build one and share it.
    pub fn new(rates: RateTable) -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| PairError::config(format!("Failed to load cl100k_base tokenizer: {}", e)))?;
        debug!("Loaded cl100k_base tokenizer.");
        Ok(Self {
            bpe: Arc::new(bpe),
            rates,
        })
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    pub fn text_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    pub fn image_tokens(&self, image_data_url: &str, detail: ImageDetail) -> Result<usize> {
        match detail {
            ImageDetail::Low => Ok(LOW_DETAIL_IMAGE_TOKENS),
            ImageDetail::High => {
                let (width, height) = data_url_dimensions(image_data_url)?;
                let tokens = tiled_image_tokens(width, height);
                trace!(width, height, tokens, "Computed high-detail image tokens.");
                Ok(tokens)
            }
        }
    }

    pub fn message_tokens(&self, message: &ChatMessage) -> Result<usize> {
        let content_tokens = match message.content() {
            MessageContent::Text(text) => self.text_tokens(text),
            MessageContent::Parts(parts) => {
                let mut total = 0;
                for part in parts {
                    total += match part {
                        ContentPart::Text { text } => self.text_tokens(text),
                        ContentPart::ImageUrl { image_url } => {
                            self.image_tokens(&image_url.url, image_url.detail)?
                        }
                    };
                }
                total
            }
        };
        Ok(content_tokens + MESSAGE_OVERHEAD)
    }

    pub fn request_tokens(&self, messages: &[ChatMessage]) -> Result<usize> {
        let mut total = REQUEST_OVERHEAD;
        for message in messages {
            total += self.message_tokens(message)?;
        }
        Ok(total)
    }

    pub fn price(&self, model: &str, input_tokens: usize, output_tokens: usize) -> Result<f64> {
        let rates = self.rates.get(model)?;
        Ok((rates.input * input_tokens as f64 + rates.output * output_tokens as f64) / 1000.0)
    }
}

/// High-detail cost of a `width` x `height` image under the 512px tiling model.
pub fn tiled_image_tokens(width: u32, height: u32) -> usize {
    // every side stays at least one pixel so the rescale below never divides by zero
    let (mut w, mut h) = (f64::from(width).max(1.0), f64::from(height).max(1.0));

    let longest = w.max(h);
    if longest > IMAGE_MAX_SIDE {
        let ratio = IMAGE_MAX_SIDE / longest;
        w = (w * ratio).round().max(1.0);
        h = (h * ratio).round().max(1.0);
    }

    let ratio = IMAGE_SHORT_SIDE / w.min(h);
    w = (w * ratio).round().max(1.0);
    h = (h * ratio).round().max(1.0);

    let tiles = (w / IMAGE_TILE_SIDE).ceil() as usize * (h / IMAGE_TILE_SIDE).ceil() as usize;
    IMAGE_BASE_TOKENS + IMAGE_TILE_TOKENS * tiles
}

/// Decodes a `data:<mime>;base64,<payload>` URL and returns the image's pixel size.
pub fn data_url_dimensions(data_url: &str) -> Result<(u32, u32)> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| PairError::InvalidImageData("image reference is not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| PairError::InvalidImageData("data URL has no payload".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(PairError::InvalidImageData(
            "data URL payload is not base64 encoded".to_string(),
        ));
    }
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| PairError::InvalidImageData(format!("bad base64 payload: {}", e)))?;
    image_dimensions(&bytes)
}

/// Reads the pixel size of an encoded image without decoding its pixels.
pub fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PairError::InvalidImageData(e.to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| PairError::InvalidImageData(e.to_string()))?;
    if width == 0 || height == 0 {
        return Err(PairError::InvalidImageData(format!(
            "image has an empty dimension ({}x{})",
            width, height
        )));
    }
    Ok((width, height))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::chat::Role;
    use image::{ImageFormat, RgbImage};

    pub(crate) fn png_data_url(width: u32, height: u32) -> String {
        let mut bytes = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", BASE64.encode(bytes.into_inner()))
    }

    fn accountant() -> TokenAccountant {
        TokenAccountant::new(RateTable::default()).unwrap()
    }

    #[test]
    fn test_text_tokens_deterministic() {
        let acct = accountant();
        let text = "fn main() { println!(\"hello\"); }";
        let first = acct.text_tokens(text);
        assert!(first > 0);
        assert_eq!(first, acct.text_tokens(text));
        assert_eq!(acct.text_tokens(""), 0);
        assert_eq!(acct.text_tokens("hello world"), 2);
    }

    #[test]
    fn test_tiled_image_tokens_square() {
        // 1024x1024 -> 768x768 -> 2x2 tiles
        assert_eq!(tiled_image_tokens(1024, 1024), 765);
    }

    #[test]
    fn test_tiled_image_tokens_wide() {
        // 2048x1024 -> 1536x768 -> 3x2 tiles
        assert_eq!(tiled_image_tokens(2048, 1024), 85 + 170 * 6);
        // 4096x2048 is capped to 2048x1024 first and lands on the same cost
        assert_eq!(tiled_image_tokens(4096, 2048), 85 + 170 * 6);
    }

    #[test]
    fn test_tiled_image_tokens_stable_past_cap() {
        let at_cap = tiled_image_tokens(2048, 1536);
        let mut previous = at_cap;
        for side in [3000u32, 4096, 8192] {
            let tokens = tiled_image_tokens(side, side * 3 / 4);
            assert!(tokens >= previous);
            assert_eq!(tokens, at_cap);
            previous = tokens;
        }
    }

    #[test]
    fn test_thin_images_keep_capped_cost() {
        // 1x2048 -> 768x1572864 -> 2x3072 tiles
        let at_cap = tiled_image_tokens(1, 2048);
        assert_eq!(at_cap, 85 + 170 * 2 * 3072);
        for long_side in [2049u32, 4096, 10000] {
            assert_eq!(tiled_image_tokens(1, long_side), at_cap, "1x{}", long_side);
            assert_eq!(tiled_image_tokens(long_side, 1), at_cap, "{}x1", long_side);
        }

        let acct = accountant();
        let url = png_data_url(1, 10000);
        assert_eq!(acct.image_tokens(&url, ImageDetail::High).unwrap(), at_cap);
    }

    #[test]
    fn test_image_tokens_decodes_data_url() {
        let acct = accountant();
        let url = png_data_url(1024, 1024);
        assert_eq!(acct.image_tokens(&url, ImageDetail::High).unwrap(), 765);
        assert_eq!(
            acct.image_tokens(&url, ImageDetail::Low).unwrap(),
            LOW_DETAIL_IMAGE_TOKENS
        );
    }

    #[test]
    fn test_invalid_image_data() {
        let acct = accountant();
        for url in [
            "https://example.com/cat.png",
            "data:image/png;base64",
            "data:image/png,AAAA",
            "data:image/png;base64,!!!not-base64!!!",
            "data:image/png;base64,aGVsbG8gd29ybGQ=",
        ] {
            let err = acct.image_tokens(url, ImageDetail::High).unwrap_err();
            assert!(
                matches!(err, PairError::InvalidImageData(_)),
                "{} gave {:?}",
                url,
                err
            );
        }
    }

    #[test]
    fn test_message_tokens() {
        let acct = accountant();
        let text_msg = ChatMessage::user("hello world");
        assert_eq!(acct.message_tokens(&text_msg).unwrap(), 2 + MESSAGE_OVERHEAD);

        let parts_msg = ChatMessage::with_parts(
            Role::User,
            vec![
                ContentPart::text("hello world").unwrap(),
                ContentPart::image(png_data_url(1024, 1024), ImageDetail::High).unwrap(),
            ],
        );
        assert_eq!(
            acct.message_tokens(&parts_msg).unwrap(),
            2 + 765 + MESSAGE_OVERHEAD
        );
    }

    #[test]
    fn test_request_tokens() {
        let acct = accountant();
        assert_eq!(acct.request_tokens(&[]).unwrap(), REQUEST_OVERHEAD);
        let messages = vec![ChatMessage::system("hello world"), ChatMessage::user("hello world")];
        assert_eq!(
            acct.request_tokens(&messages).unwrap(),
            REQUEST_OVERHEAD + 2 * (2 + MESSAGE_OVERHEAD)
        );
    }

    #[test]
    fn test_price() {
        let acct = accountant();
        let turbo = acct.price("gpt-4-turbo-2024-04-09", 1000, 1000).unwrap();
        assert!((turbo - 0.04).abs() < 1e-12, "{}", turbo);
        let gpt4 = acct.price("gpt-4", 1000, 1000).unwrap();
        assert!((gpt4 - 0.09).abs() < 1e-12, "{}", gpt4);
        let cheap = acct.price("gpt-3.5-turbo", 500, 500).unwrap();
        assert!((cheap - 0.002).abs() < 1e-12, "{}", cheap);
    }

    #[test]
    fn test_price_unknown_model() {
        let acct = accountant();
        let err = acct.price("llama-3", 1, 1).unwrap_err();
        assert!(matches!(err, PairError::UnsupportedModel(ref m) if m == "llama-3"));
    }

    #[test]
    fn test_custom_rate_table() {
        let mut rates = RateTable::empty();
        rates.insert("local", Rates { input: 0.0, output: 0.0 });
        let acct = TokenAccountant::new(rates).unwrap();
        assert_eq!(acct.price("local", 10_000, 10_000).unwrap(), 0.0);
        assert!(acct.price("gpt-4", 1, 1).is_err());
    }
}
