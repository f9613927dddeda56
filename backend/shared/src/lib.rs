pub mod image_ref;
pub mod models;

pub use image_ref::{parse_image_digest, parse_image_path, ImageRef};
pub use models::{
    ApiError, Container, ContainerEnvelope, ContainersEnvelope, Crawler, CrawlerEnvelope,
    CrawlerMessages, Feature, Image, ImageEnvelope, ImageReviewStatus, ImagesEnvelope,
    K8sContainer, K8sCrawlerEnvelope, K8sCrawlerRequest, K8sImagePolicy, K8sImagePolicyEnvelope,
    K8sImageSpec, Policy, PoliciesEnvelope, PolicyEnvelope, RegCrawlerEnvelope, RegCrawlerRequest,
    Violation, Vulnerability,
};
