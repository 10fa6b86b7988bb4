use std::sync::Arc;

use serde_json::Value;

use crate::error::ApiResult;
use crate::models::{Category, CategoryRequest, Product, ProductRequest};
use crate::pipeline::{ApiRequest, RequestPipeline};

pub struct ProductService {
    pipeline: Arc<RequestPipeline>,
}

impl ProductService {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self { Self { pipeline } }

    pub async fn get_products(&self) -> ApiResult<Vec<Product>> {
        self.pipeline.send_json(ApiRequest::get("/products")).await
    }

    pub async fn get_product(&self, id: i64) -> ApiResult<Product> {
        self.pipeline.send_json(ApiRequest::get(format!("/products/{}", id))).await
    }

    pub async fn create_product(&self, product: &ProductRequest) -> ApiResult<Product> {
        let request = ApiRequest::post("/products", Value::Null).with_json(product)?;
        self.pipeline.send_json(request).await
    }

    pub async fn update_product(&self, id: i64, product: &ProductRequest) -> ApiResult<Product> {
        let request = ApiRequest::put(format!("/products/{}", id), Value::Null).with_json(product)?;
        self.pipeline.send_json(request).await
    }

    pub async fn delete_product(&self, id: i64) -> ApiResult<()> {
        self.pipeline.send_empty(ApiRequest::delete(format!("/products/{}", id))).await
    }

    pub async fn get_categories(&self) -> ApiResult<Vec<Category>> {
        self.pipeline.send_json(ApiRequest::get("/categories")).await
    }

    pub async fn create_category(&self, category: &CategoryRequest) -> ApiResult<Category> {
        let request = ApiRequest::post("/categories", Value::Null).with_json(category)?;
        self.pipeline.send_json(request).await
    }
}
