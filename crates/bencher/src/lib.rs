#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    file: TestFile,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, file: TestFile) -> Self {
        Self { name, group, file }
    }

    pub fn small(name: &'static str, file: TestFile) -> Self {
        Self::new(name, TestGroup::Small, file)
    }

    pub fn normal(name: &'static str, file: TestFile) -> Self {
        Self::new(name, TestGroup::Normal, file)
    }

    pub fn large(name: &'static str, file: TestFile) -> Self {
        Self::new(name, TestGroup::Large, file)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }

    pub fn file_name(&self) -> &'static str {
        self.file().file_name
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content: &'static str,
}

impl TestFile {
    pub const fn new(file_name: &'static str, content: &'static str) -> Self {
        Self { file_name, content }
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}

/// A minimal browser-like GET.
pub const GET_SMALL: &str = "GET /index.html HTTP/1.1\r\nHost: localhost:8080\r\nUser-Agent: bench\r\nAccept: */*\r\n\r\n";

/// A GET carrying the header set of a typical browser navigation.
pub const GET_LARGE: &str = concat!(
    "GET /api/v1/items?page=2&size=50 HTTP/1.1\r\n",
    "Host: localhost:8080\r\n",
    "Connection: keep-alive\r\n",
    "Cache-Control: max-age=0\r\n",
    "User-Agent: Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36\r\n",
    "Accept: text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8\r\n",
    "Accept-Encoding: gzip, deflate, br\r\n",
    "Accept-Language: en-US,en;q=0.9\r\n",
    "Cookie: session=4f6b1c2d9e8a7b6c5d4e3f2a1b0c9d8e; theme=dark; tz=Europe%2FBerlin\r\n",
    "If-None-Match: \"33a64df551425fcc55e4d42a148795d9f25f89d4\"\r\n",
    "If-Modified-Since: Wed, 21 Oct 2015 07:28:00 GMT\r\n",
    "Referer: http://localhost:8080/api/v1/items?page=1&size=50\r\n",
    "X-Request-Id: 8d1c5a2e-5b7f-4c0a-9f3e-2a6d4b8c1e7f\r\n",
    "X-Forwarded-For: 10.0.0.1, 10.0.0.2\r\n",
    "\r\n",
);

/// A POST with a fixed length body.
pub const POST_BODY: &str = concat!(
    "POST /upload HTTP/1.1\r\n",
    "Host: localhost:8080\r\n",
    "Content-Type: application/json\r\n",
    "Content-Length: 64\r\n",
    "\r\n",
    "{\"name\":\"bench\",\"items\":[1,2,3,4,5,6,7,8,9,10],\"ok\":true,\"n\":10}",
);
