//! 凭据混淆与解混淆
//!
//! 配置中的密码以可逆加密形式存储（16 字节 IV 前置的 AES-CTR 密文，
//! URL-safe base64 编码），加载时解密为明文。解密失败时按历史行为
//! 原样返回输入，调用方通过 [`Revealed`] 区分两种结果。

use aes::{Aes128, Aes256};
use anyhow::{anyhow, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::{alphabet, engine, Engine};
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;

/// 64 位大端计数器的 AES-CTR
type Aes128Ctr = ctr::Ctr64BE<Aes128>;
type Aes256Ctr = ctr::Ctr64BE<Aes256>;

/// 默认混淆密钥（历史默认值）。构造 [`crate::config::RemoteResolver`]
/// 时可注入外部密钥覆盖它。
pub const DEFAULT_OBSCURE_KEY: [u8; 32] = [
    0x9c, 0x93, 0x5b, 0x48, 0x73, 0x0a, 0x55, 0x4d, 0x6b, 0xfd, 0x7c, 0x63, 0xc8, 0x86, 0xa9,
    0x2b, 0xd3, 0x90, 0x19, 0x8e, 0xb8, 0x12, 0x8a, 0xfb, 0xf4, 0xde, 0x16, 0x2b, 0x8b, 0x95,
    0xf6, 0x38,
];

/// 标准字母表、填充宽松的解码器（混淆串通常无填充）
const STANDARD_INDIFFERENT: engine::GeneralPurpose = engine::GeneralPurpose::new(
    &alphabet::STANDARD,
    engine::GeneralPurposeConfig::new()
        .with_decode_padding_mode(engine::DecodePaddingMode::Indifferent),
);

/// 解混淆结果：区分真正解出的明文与回退原文
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revealed {
    /// 成功解密出的明文
    Decrypted(String),
    /// 解码或解密失败，原样保留输入
    Fallback(String),
}

impl Revealed {
    /// 取出最终用作密码的字符串
    pub fn into_secret(self) -> String {
        match self {
            Revealed::Decrypted(s) | Revealed::Fallback(s) => s,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Revealed::Fallback(_))
    }
}

/// 解混淆。任一步骤失败（base64、密钥长度、UTF-8）都回退为原始输入
pub fn reveal(obscured: &str, key: &[u8]) -> Revealed {
    match try_reveal(obscured, key) {
        Some(plain) => Revealed::Decrypted(plain),
        None => Revealed::Fallback(obscured.to_string()),
    }
}

fn try_reveal(obscured: &str, key: &[u8]) -> Option<String> {
    // URL-safe 字母表转换回标准字母表再解码
    let translated: String = obscured
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    let decoded = STANDARD_INDIFFERENT.decode(translated.as_bytes()).ok()?;

    // 不足一个 IV 的长度视为未混淆的明文
    if decoded.len() < 16 {
        return None;
    }

    let (iv, ciphertext) = decoded.split_at(16);
    let mut buf = ciphertext.to_vec();
    apply_ctr(key, iv, &mut buf).ok()?;

    String::from_utf8(buf).ok()
}

/// 混淆明文：随机 16 字节 IV，输出 URL-safe 无填充 base64 的 IV||密文
pub fn obscure(plain: &str, key: &[u8]) -> Result<String> {
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut buf = plain.as_bytes().to_vec();
    apply_ctr(key, &iv, &mut buf)?;

    let mut out = Vec::with_capacity(16 + buf.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&buf);
    Ok(URL_SAFE_NO_PAD.encode(out))
}

/// 按密钥长度选择 AES-128/AES-256，CTR 模式原地加解密
fn apply_ctr(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()> {
    match key.len() {
        16 => {
            let mut cipher = Aes128Ctr::new_from_slices(key, iv)
                .map_err(|e| anyhow!("无效的密钥/IV 长度: {}", e))?;
            cipher.apply_keystream(buf);
        }
        32 => {
            let mut cipher = Aes256Ctr::new_from_slices(key, iv)
                .map_err(|e| anyhow!("无效的密钥/IV 长度: {}", e))?;
            cipher.apply_keystream(buf);
        }
        n => return Err(anyhow!("不支持的密钥长度: {} 字节", n)),
    }
    Ok(())
}
