use url::Url;

// 空行和 # 开头的行（注释或播放列表指令）都不是分片
pub fn is_directive(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

/// 把清单中的一行分片引用解析为绝对地址
///
/// - `http://` / `https://` 开头：原样使用
/// - `/` 开头：相对于清单所在主机的根目录
/// - 其它：相对于清单所在目录
pub fn resolve_reference(reference: &str, base: &Url) -> Option<Url> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Url::parse(reference).ok();
    }

    if reference.starts_with('/') {
        return resolve_root_relative(reference, base);
    }

    base.join(reference).ok()
}

fn resolve_root_relative(reference: &str, base: &Url) -> Option<Url> {
    if base.cannot_be_a_base() {
        return None;
    }

    let (path, query) = match reference.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (reference, None),
    };

    let mut url = base.clone();
    url.set_path(path);
    url.set_query(query);
    url.set_fragment(None);
    Some(url)
}
