/// Network numbers operated by large cloud and platform providers.
pub const PROVIDERS: &[(u32, &str)] = &[
    (8075, "Microsoft"),
    (13238, "Yandex"),
    (14061, "DigitalOcean"),
    (14618, "Amazon"),
    (15169, "Google"),
    (16509, "Amazon"),
    (16550, "Google"),
    (19527, "Google"),
    (24429, "Alibaba"),
    (31898, "Oracle"),
    (36040, "Google"),
    (36385, "Google"),
    (37963, "Alibaba"),
    (38627, "Baidu"),
    (43515, "Google"),
    (45090, "Tencent"),
    (45102, "Alibaba"),
    (45566, "Google"),
    (55967, "Baidu"),
    (132203, "Tencent"),
    (132591, "Tencent"),
    (139070, "Google"),
    (139190, "Google"),
    (208722, "Yandex"),
];

pub fn organization_for(asn: u32) -> Option<&'static str> {
    PROVIDERS
        .binary_search_by_key(&asn, |(number, _)| *number)
        .ok()
        .map(|idx| PROVIDERS[idx].1)
}
