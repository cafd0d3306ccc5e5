use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use stealing_webserver::request::Request;

fn modern_request_parse_benchmark(c: &mut Criterion) {
    let request = b"GET /index.html HTTP/1.0\r\nUser-Agent: Test\r\n\r\n";

    c.bench_function("modern_request_parse", |b| {
        b.iter(|| {
            let request = Request::parse(black_box(request), 0);
            assert!(request.is_ok());
        });
    });
}

fn browser_request_parse_benchmark(c: &mut Criterion) {
    let request = b"GET /path/to/resource?id=123&name=test HTTP/1.0\r\n\
                    Host: localhost:7878\r\n\
                    User-Agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64)\r\n\
                    Accept: text/html,application/xhtml+xml\r\n\
                    Accept-Language: en-US,en;q=0.9\r\n\
                    Accept-Encoding: gzip, deflate, br\r\n\
                    Connection: keep-alive\r\n\
                    \r\n";

    c.bench_function("browser_request_parse", |b| {
        b.iter(|| {
            let _ = Request::parse(black_box(request), 0);
        });
    });
}

fn request_parse_outcomes_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_outcomes");

    let requests = [
        ("ok", b"GET / HTTP/1.0\r\n\r\n".as_slice()),
        ("legacy", b"GET /index.html\r\n".as_slice()),
        ("method_not_allowed", b"POST / HTTP/1.0\r\n\r\n".as_slice()),
        ("version_not_supported", b"GET / HTTP/2.0\r\n\r\n".as_slice()),
        ("bad_request", b"OPTIONS * HTTP/1.0\r\n\r\n".as_slice()),
        ("no_terminator", b"GET /never/ending".as_slice()),
    ];

    for (name, request) in requests.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), request, |b, request| {
            b.iter(|| {
                let _ = Request::parse(black_box(request), 0);
            });
        });
    }

    group.finish();
}

fn request_parse_different_path_lengths_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_path_length");

    let paths = [
        ("short", "/"),
        ("medium", "/path/to/resource"),
        ("long", "/very/long/path/to/some/resource/with/many/segments/and/a/query?param1=value1&param2=value2&param3=value3"),
    ];

    for (name, path) in paths.iter() {
        let request = format!("GET {} HTTP/1.0\r\nUser-Agent: Test\r\n\r\n", path);
        group.bench_with_input(BenchmarkId::from_parameter(name), &request, |b, request| {
            b.iter(|| {
                let _ = Request::parse(black_box(request.as_bytes()), 0);
            });
        });
    }

    group.finish();
}

fn request_parse_header_count_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_parse_header_count");

    for count in [0, 10, 100].iter() {
        let mut request = String::from("GET / HTTP/1.0\r\n");
        for i in 0..*count {
            request.push_str(&format!("X-Header-{}: value-{}\r\n", i, i));
        }
        request.push_str("\r\n");

        group.bench_with_input(BenchmarkId::from_parameter(count), &request, |b, request| {
            b.iter(|| {
                let _ = Request::parse(black_box(request.as_bytes()), 0);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    modern_request_parse_benchmark,
    browser_request_parse_benchmark,
    request_parse_outcomes_benchmark,
    request_parse_different_path_lengths_benchmark,
    request_parse_header_count_benchmark
);
criterion_main!(benches);
