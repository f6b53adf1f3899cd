// 该文件是 Honglvdeng （红绿灯） 项目的一部分。
// tests/http.rs - HTTP 接口测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

#![cfg(feature = "model_classify")]

use std::io::Cursor;

use actix_web::{App, http::StatusCode, http::header, test, web};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;

use honglvdeng::{
  model::{CnnClassifier, ModelWrapper},
  server::{self, HEALTH_MESSAGE, InferenceSession, UploadConfig},
};

const BOUNDARY: &str = "----honglvdengtestboundary";

fn zero_session() -> web::Data<InferenceSession> {
  let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
  let model = CnnClassifier::from_var_builder(vb, Device::Cpu).unwrap();
  web::Data::new(InferenceSession::new(ModelWrapper::Classify(model)))
}

fn png_bytes() -> Vec<u8> {
  let image = RgbImage::from_fn(80, 30, |x, _| Rgb([(x * 3) as u8, 40, 40]));
  let mut bytes = Vec::new();
  image
    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
    .unwrap();
  bytes
}

fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
  let mut body = Vec::new();
  body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
  body.extend_from_slice(
    format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n").as_bytes(),
  );
  body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
  body.extend_from_slice(content);
  body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
  body
}

async fn post_predict(limit: usize, body: Vec<u8>) -> Value {
  let app = test::init_service(
    App::new()
      .app_data(zero_session())
      .app_data(web::Data::new(UploadConfig { limit }))
      .configure(server::routes),
  )
  .await;

  let req = test::TestRequest::post()
    .uri("/predict")
    .insert_header((
      header::CONTENT_TYPE,
      format!("multipart/form-data; boundary={BOUNDARY}"),
    ))
    .set_payload(body)
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  test::read_body_json(resp).await
}

#[actix_web::test]
async fn health_reports_working() {
  let app = test::init_service(App::new().app_data(zero_session()).configure(server::routes)).await;
  let req = test::TestRequest::get().uri("/").to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);

  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["message"], HEALTH_MESSAGE);
}

#[actix_web::test]
async fn png_upload_is_classified() {
  let body = post_predict(1024 * 1024, multipart_body("file", "light.png", &png_bytes())).await;

  let prediction = &body["prediction"];
  assert_eq!(prediction["class"], "red");
  assert_eq!(prediction["class_index"], 0);
  let confidence = prediction["confidence"].as_f64().unwrap();
  assert!((confidence - 0.3333).abs() < 1e-4);
  assert!(body.get("error").is_none());
}

#[actix_web::test]
async fn repeated_requests_agree() {
  let first = post_predict(1024 * 1024, multipart_body("file", "light.png", &png_bytes())).await;
  let second = post_predict(1024 * 1024, multipart_body("file", "light.png", &png_bytes())).await;
  assert_eq!(first, second);
}

#[actix_web::test]
async fn non_image_upload_reports_error() {
  let body = post_predict(1024 * 1024, multipart_body("file", "notes.txt", b"hello world")).await;
  let error = body["error"].as_str().unwrap();
  assert!(error.starts_with("cannot identify image file"));
}

#[actix_web::test]
async fn empty_upload_reports_error() {
  let body = post_predict(1024 * 1024, multipart_body("file", "empty.png", b"")).await;
  assert_eq!(body["error"], "empty upload");
}

#[actix_web::test]
async fn missing_file_field_reports_error() {
  let body = post_predict(1024 * 1024, multipart_body("image", "light.png", &png_bytes())).await;
  let error = body["error"].as_str().unwrap();
  assert!(error.contains("'file'"));
}

#[actix_web::test]
async fn oversize_upload_reports_error() {
  let body = post_predict(16, multipart_body("file", "light.png", &png_bytes())).await;
  let error = body["error"].as_str().unwrap();
  assert!(error.contains("limit of 16 bytes"));
}
