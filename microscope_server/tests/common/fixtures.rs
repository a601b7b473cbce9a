use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

pub fn solid_image(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

pub fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("png encoding");
    bytes
}

pub fn png_base64(image: &RgbImage) -> String {
    BASE64.encode(png_bytes(image))
}

pub fn decode_base64_image(text: &str) -> RgbImage {
    let bytes = BASE64.decode(text).expect("valid base64");
    image::load_from_memory(&bytes)
        .expect("valid image")
        .to_rgb8()
}
