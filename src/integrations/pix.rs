//! PIX payment charges.
//!
//! Builds a static BR Code (EMV merchant-presented payload) for an amount and
//! renders it as a base64 PNG QR code.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Cursor;

use crate::billing::round_money;

const PIX_GUI: &str = "br.gov.bcb.pix";
const MAX_NAME_LEN: usize = 25;
const MAX_CITY_LEN: usize = 15;
const QR_MIN_DIMENSION: u32 = 256;

/// Who receives the payment.
#[derive(Debug, Clone)]
pub struct PayeeInfo {
    pub key: String,
    pub name: String,
    pub city: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PixCharge {
    pub payload: String,
    pub image_base64: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PixError {
    #[error("payee key is not configured")]
    MissingKey,
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Decimal),
    #[error("QR encoding failed: {0}")]
    Qr(#[from] qrcode::types::QrError),
    #[error("PNG encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

pub trait PaymentQrGenerator: Send + Sync {
    fn generate(&self, payee: &PayeeInfo, amount: Decimal) -> Result<PixCharge, PixError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PixQrGenerator;

impl PaymentQrGenerator for PixQrGenerator {
    fn generate(&self, payee: &PayeeInfo, amount: Decimal) -> Result<PixCharge, PixError> {
        let payload = build_payload(payee, amount)?;
        let image_base64 = render_png_base64(&payload)?;
        Ok(PixCharge {
            payload,
            image_base64,
        })
    }
}

/// EMV field: two-digit id, two-digit length, value.
fn field(id: &str, value: &str) -> String {
    format!("{}{:02}{}", id, value.len(), value)
}

fn truncate(value: &str, max: usize) -> String {
    value
        .trim()
        .chars()
        .filter(char::is_ascii)
        .take(max)
        .collect::<String>()
        .to_uppercase()
}

/// Build the BR Code payload, CRC included.
pub fn build_payload(payee: &PayeeInfo, amount: Decimal) -> Result<String, PixError> {
    if payee.key.trim().is_empty() {
        return Err(PixError::MissingKey);
    }
    if amount <= Decimal::ZERO {
        return Err(PixError::InvalidAmount(amount));
    }

    let merchant_account = format!("{}{}", field("00", PIX_GUI), field("01", payee.key.trim()));
    let amount = format!("{:.2}", round_money(amount, 2));

    let mut payload = String::new();
    payload.push_str(&field("00", "01"));
    payload.push_str(&field("26", &merchant_account));
    payload.push_str(&field("52", "0000"));
    payload.push_str(&field("53", "986"));
    payload.push_str(&field("54", &amount));
    payload.push_str(&field("58", "BR"));
    payload.push_str(&field("59", &truncate(&payee.name, MAX_NAME_LEN)));
    payload.push_str(&field("60", &truncate(&payee.city, MAX_CITY_LEN)));
    payload.push_str(&field("62", &field("05", "***")));
    payload.push_str("6304");

    let crc = crc16_ccitt(payload.as_bytes());
    payload.push_str(&format!("{:04X}", crc));
    Ok(payload)
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF).
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn render_png_base64(payload: &str) -> Result<String, PixError> {
    let code = QrCode::new(payload.as_bytes())?;
    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(image).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(STANDARD.encode(png))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payee() -> PayeeInfo {
        PayeeInfo {
            key: "flat@example.com".to_string(),
            name: "Flat Fersa Locacoes e Administracao".to_string(),
            city: "Sao Jose dos Campos".to_string(),
        }
    }

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_payload_layout() {
        let payload = build_payload(&payee(), dec!(1040.4)).unwrap();
        assert!(payload.starts_with("000201"));
        assert!(payload.contains("0014br.gov.bcb.pix0116flat@example.com"));
        assert!(payload.contains("5204000053039865407"));
        assert!(payload.contains("1040.40"));
        assert!(payload.contains("5802BR"));
        assert!(payload.contains("5925FLAT FERSA LOCACOES E AD"));
        assert!(payload.contains("6015SAO JOSE DOS CA"));
        assert!(payload.contains("62070503***"));
    }

    #[test]
    fn test_payload_crc_matches_body() {
        let payload = build_payload(&payee(), dec!(22.5)).unwrap();
        let (body, crc) = payload.split_at(payload.len() - 4);
        assert!(body.ends_with("6304"));
        assert_eq!(crc, format!("{:04X}", crc16_ccitt(body.as_bytes())));
    }

    #[test]
    fn test_payload_rejects_bad_input() {
        let mut no_key = payee();
        no_key.key = "  ".to_string();
        assert!(matches!(build_payload(&no_key, dec!(10)), Err(PixError::MissingKey)));
        assert!(matches!(
            build_payload(&payee(), dec!(0)),
            Err(PixError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_generate_renders_png() {
        let charge = PixQrGenerator.generate(&payee(), dec!(1200)).unwrap();
        let png = STANDARD.decode(&charge.image_base64).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        assert!(charge.payload.contains("1200.00"));
    }
}
